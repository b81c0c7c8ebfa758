fn main() {
    if let Err(err) = studyfocus_lib::run() {
        eprintln!("studyfocus: {err:#}");
        std::process::exit(1);
    }
}
