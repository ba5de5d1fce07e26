use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use tsinghua_ssvep::doctest_utils::{seed_beta, seed_wang2016, synthetic_sample, write_beta_mat};
use tsinghua_ssvep::download::url_to_local_path;
use tsinghua_ssvep::tsinghua::{channel_layout, TSINGHUA_SIGN, WANG2016_URL};
use tsinghua_ssvep::{
    Beta, ChannelType, Dataset, DatasetError, FetchOptions, MatWriter, SubjectData, Wang2016,
};

// 试次长度取 130 个采样点，刚好包含 0.5 s 处的刺激标记
const N_TIMES: usize = 130;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn wang(root: &Path) -> Wang2016 {
    Wang2016::new().with_options(FetchOptions::new().with_path(root))
}

fn beta(root: &Path) -> Beta {
    Beta::new().with_options(FetchOptions::new().with_path(root))
}

fn cache_dir(root: &Path, url: &str) -> PathBuf {
    let archive = url_to_local_path(url, root, TSINGHUA_SIGN).unwrap();
    let dir = archive.parent().unwrap().to_path_buf();
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn assert_runs(subject: &SubjectData, n_blocks: usize) {
    assert_eq!(subject.keys().collect::<Vec<_>>(), vec!["session_0"]);
    let session = &subject["session_0"];
    assert_eq!(session.len(), n_blocks);

    let (names, types) = channel_layout();
    for block in 0..n_blocks {
        let raw = &session[&format!("run_{}", block)];
        assert_eq!(raw.data().dim(), (65, 40 * N_TIMES));
        assert_eq!(raw.ch_names(), names.as_slice());
        assert_eq!(raw.info().ch_types, types);
        assert_eq!(raw.info().sfreq, 250.0);
        assert_eq!(raw.montage(), Some("standard_1010"));

        // 每个通道、每个试次抽查几个采样点
        for channel in [0, 31, 63] {
            for class in [0, 17, 39] {
                for time in [0, 125, N_TIMES - 1] {
                    let expected = synthetic_sample(channel, time, class, block) * 1e-6;
                    let actual = raw.data()[[channel, class * N_TIMES + time]];
                    assert!((actual - expected).abs() < 1e-15, "run_{} ch {} class {}", block, channel, class);
                }
            }
        }

        let stim = raw.channel("STI 014").unwrap();
        assert_eq!(stim.iter().filter(|&&v| v != 0.0).count(), 40);
        let events = raw.events();
        assert_eq!(events.len(), 40);
        for (class, event) in events.iter().enumerate() {
            assert_eq!(event.sample, class * N_TIMES + 125);
            assert_eq!(event.code, class as i64 + 1);
        }
    }
}

#[test]
fn test_wang2016_subject_from_cache() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let file = seed_wang2016(dir.path(), 1, N_TIMES).unwrap();

    let dataset = wang(dir.path());
    let paths = dataset.data_path(1).unwrap();
    assert_eq!(paths, vec![vec![file]]);

    let subject = dataset.subject_data(1).unwrap();
    assert_runs(&subject, 6);

    let run = &subject["session_0"]["run_2"];
    assert_eq!(run.duration(), 40.0 * N_TIMES as f64 / 250.0);
    assert_eq!(run.info().picks(ChannelType::Misc), vec![59, 63]);
    assert!(run.position(0).is_some());
    assert!(run.position(64).is_none());
}

#[test]
fn test_loading_twice_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    seed_wang2016(dir.path(), 4, N_TIMES).unwrap();

    let dataset = wang(dir.path());
    let first = dataset.subject_data(4).unwrap();
    let second = dataset.subject_data(4).unwrap();
    for (name, raw) in &first["session_0"] {
        assert_eq!(raw.data(), second["session_0"][name].data());
    }
}

#[test]
fn test_wang2016_extracts_7z_archive() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let staged = seed_wang2016(staging.path(), 2, N_TIMES).unwrap();

    // 只含 S2.mat 的目录压缩成 S2.mat.7z，放到缓存中的下载位置
    let source = staging.path().join("archive");
    fs::create_dir_all(&source).unwrap();
    fs::rename(&staged, source.join("S2.mat")).unwrap();
    let cache = cache_dir(dir.path(), &format!("{}S2.mat.7z", WANG2016_URL));
    sevenz_rust::compress_to_path(&source, cache.join("S2.mat.7z")).unwrap();

    let dataset = wang(dir.path());
    let paths = dataset.data_path(2).unwrap();
    assert_eq!(paths[0][0], cache.join("S2.mat"));
    assert!(paths[0][0].exists());

    let subject = dataset.subject_data(2).unwrap();
    assert_runs(&subject, 6);
}

#[test]
fn test_beta_extracts_decade_zip() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let dataset = beta(dir.path());
    let cache = cache_dir(dir.path(), &dataset.subject_url(13));
    let archive = cache.join("S11-S20.mat.zip");

    let staging = tempfile::tempdir().unwrap();
    let staged = staging.path().join("S13.mat");
    write_beta_mat(&staged, N_TIMES).unwrap();
    {
        let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("S13.mat", options).unwrap();
        zip.write_all(&fs::read(&staged).unwrap()).unwrap();
        zip.start_file("S14.mat", options).unwrap();
        zip.write_all(b"another subject").unwrap();
        zip.finish().unwrap();
    }

    let paths = dataset.data_path(13).unwrap();
    assert_eq!(paths, vec![vec![cache.join("S13.mat")]]);
    assert!(cache.join("S14.mat").exists());

    // 已解压后不再需要压缩包
    fs::remove_file(&archive).unwrap();
    assert_eq!(dataset.data_path(13).unwrap(), paths);

    let subject = dataset.subject_data(13).unwrap();
    assert_runs(&subject, 4);
}

#[test]
fn test_beta_subject_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let file = seed_beta(dir.path(), 65, N_TIMES).unwrap();
    assert!(file.ends_with("upload/liubingchuan/S65.mat"));

    let subject = beta(dir.path()).subject_data(65).unwrap();
    assert_runs(&subject, 4);
}

#[test]
fn test_invalid_subject_before_io() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("never-created");

    for subject in [0, 36, 100] {
        let result = wang(&root).subject_data(subject);
        assert!(matches!(
            result,
            Err(DatasetError::InvalidSubject { ref dataset, subject: s }) if dataset == "wang2016" && s == subject
        ));
    }
    assert!(matches!(beta(&root).data_path(71), Err(DatasetError::InvalidSubject { .. })));
    assert!(matches!(beta(&root).get_data(&[1, 0]), Err(DatasetError::InvalidSubject { subject: 0, .. })));
    assert!(!root.exists());
}

#[test]
fn test_get_data_loads_each_subject() {
    let dir = tempfile::tempdir().unwrap();
    seed_wang2016(dir.path(), 1, N_TIMES).unwrap();
    seed_wang2016(dir.path(), 35, N_TIMES).unwrap();

    let data = wang(dir.path()).get_data(&[35, 1]).unwrap();
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![1, 35]);
    assert_eq!(data[&35]["session_0"].len(), 6);
}

#[test]
fn test_schema_errors() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_dir(dir.path(), &format!("{}S1.mat.7z", WANG2016_URL));

    // 变量名不对
    let mut writer = MatWriter::create(cache.join("S1.mat")).unwrap();
    writer.write_array("eeg", &ArrayD::zeros(IxDyn(&[64, N_TIMES, 40, 1]))).unwrap();
    writer.finalize().unwrap();
    assert!(matches!(
        wang(dir.path()).subject_data(1),
        Err(DatasetError::MissingField(ref field)) if field == "data"
    ));

    // 通道数不对
    let mut writer = MatWriter::create(cache.join("S2.mat")).unwrap();
    writer.write_array("data", &ArrayD::zeros(IxDyn(&[60, N_TIMES, 40, 1]))).unwrap();
    writer.finalize().unwrap();
    assert!(matches!(
        wang(dir.path()).subject_data(2),
        Err(DatasetError::ShapeMismatch { ref found, .. }) if found == &vec![60, N_TIMES, 40, 1]
    ));

    // BETA 的 data 必须是结构体
    let beta_dataset = beta(dir.path());
    let beta_cache = cache_dir(dir.path(), &beta_dataset.subject_url(1));
    let mut writer = MatWriter::create(beta_cache.join("S1.mat")).unwrap();
    writer.write_array("data", &ArrayD::zeros(IxDyn(&[64, N_TIMES, 4, 40]))).unwrap();
    writer.finalize().unwrap();
    assert!(matches!(beta_dataset.subject_data(1), Err(DatasetError::InvalidFormat(_))));
}

#[test]
fn test_force_update_hits_the_network() {
    let dir = tempfile::tempdir().unwrap();
    seed_wang2016(dir.path(), 1, N_TIMES).unwrap();

    // 缓存路径与已解压文件一致，但 force_update 仍要重新下载；端口 9 无服务
    let dataset = Wang2016::new()
        .with_base_url("http://127.0.0.1:9/upload/yijun")
        .with_options(FetchOptions::new().with_path(dir.path()).force_update(true));
    // 若环境中配置了代理，失败会表现为 HTTP 状态码
    assert!(matches!(
        dataset.data_path(1),
        Err(DatasetError::Http { .. }) | Err(DatasetError::HttpStatus { .. })
    ));
}

#[test]
#[ignore = "writes and loads a full-size subject file"]
fn test_wang2016_full_length_trials() {
    init_logger();
    // 真实数据每个试次 6 s，即 1500 个采样点
    const FULL_TIMES: usize = 1500;
    let dir = tempfile::tempdir().unwrap();
    seed_wang2016(dir.path(), 1, FULL_TIMES).unwrap();

    let subject = wang(dir.path()).subject_data(1).unwrap();
    assert_eq!(subject.len(), 1);
    let session = &subject["session_0"];
    assert_eq!(session.len(), 6);

    for (block, name) in (0..6).map(|b| (b, format!("run_{}", b))) {
        let raw = &session[&name];
        assert_eq!(raw.data().dim(), (65, 60000));
        assert_eq!(raw.duration(), 240.0);

        for (channel, class, time) in [(0, 0, 0), (63, 39, FULL_TIMES - 1), (31, 20, 1000)] {
            let expected = synthetic_sample(channel, time, class, block) * 1e-6;
            let actual = raw.data()[[channel, class * FULL_TIMES + time]];
            assert!((actual - expected).abs() < 1e-15, "{} ch {} class {}", name, channel, class);
        }

        let events = raw.events();
        assert_eq!(events.len(), 40);
        assert_eq!(events[0].sample, 125);
        assert_eq!(events[39].sample, 39 * FULL_TIMES + 125);
        assert_eq!(events[39].code, 40);
    }
}
