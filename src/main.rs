fn main() {
    if let Err(err) = plantwatch_lib::run() {
        eprintln!("plantwatch: {err:#}");
        std::process::exit(1);
    }
}
