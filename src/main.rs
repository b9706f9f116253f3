fn main() {
    if let Err(e) = retina_ai_lib::run() {
        eprintln!("retina-ai: {e}");
        std::process::exit(1);
    }
}
