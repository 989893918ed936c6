fn main() {
    if let Err(err) = csv_remedy::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
