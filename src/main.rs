fn main() {
    if let Err(e) = clipshot_lib::run() {
        log::error!("Fatal: {}", e);
        eprintln!("clipshot: {}", e);
        std::process::exit(1);
    }
}
