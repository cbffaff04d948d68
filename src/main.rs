use gitmover::ui::output;

fn main() {
    if let Err(err) = gitmover::cli::run() {
        output::error(format!("{:#}", err));
        std::process::exit(1);
    }
}
