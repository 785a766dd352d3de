fn main() {
    if let Err(err) = imagegate::cli::run() {
        if !imagegate::exit::is_denied(&err) {
            imagegate::ui::eprintln_error(&err);
        }
        std::process::exit(imagegate::exit::exit_code(&err));
    }
}
