use std::env;

use log::info;
use tsinghua_ssvep::{Beta, Dataset, FetchOptions, Result, Wang2016};

// 用法: load_subject [wang2016|beta] [subject] [cache dir]
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let name = args.get(1).map(String::as_str).unwrap_or("wang2016");
    let subject: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);

    let mut options = FetchOptions::new();
    if let Some(path) = args.get(3) {
        options = options.with_path(path);
    }
    if let Ok(proxy) = env::var("HTTPS_PROXY") {
        options = options.with_proxy(&proxy);
    }

    println!("tsinghua-ssvep {}", tsinghua_ssvep::version());
    info!("Cache root: {}", options.cache_root()?.display());

    let dataset: Box<dyn Dataset> = match name {
        "beta" => Box::new(Beta::new().with_options(options)),
        _ => Box::new(Wang2016::new().with_options(options)),
    };

    let paths = dataset.data_path(subject)?;
    for path in paths.iter().flatten() {
        println!("File: {}", path.display());
    }

    let data = dataset.subject_data(subject)?;
    for (session, runs) in &data {
        for (run, raw) in runs {
            let events = raw.events();
            println!(
                "{}/{}: {} channels x {} samples ({:.1} s), {} events",
                session,
                run,
                raw.info().n_channels(),
                raw.n_times(),
                raw.duration(),
                events.len()
            );
        }
    }

    Ok(())
}
