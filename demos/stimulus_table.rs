use tsinghua_ssvep::{Beta, Dataset, Wang2016};

fn print_table(dataset: &dyn Dataset) {
    let info = dataset.info();
    println!(
        "{} ({} subjects, {} Hz, {})",
        info.code,
        info.subjects.len(),
        info.srate,
        info.paradigm
    );
    for label in info.event_labels() {
        let k = info.events[label].code as usize - 1;
        println!(
            "  {:>2}: {:5.1} Hz  phase {:.1}π",
            label,
            dataset.freqs()[k],
            dataset.phases()[k]
        );
    }
}

fn main() {
    print_table(&Wang2016::new());
    print_table(&Beta::new());
}
