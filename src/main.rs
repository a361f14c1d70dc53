fn main() {
    if let Err(e) = imagestory_lib::run() {
        eprintln!("imagestory: {:#}", e);
        std::process::exit(1);
    }
}
