mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::Spinner;
use styling::{bright, dim, magenta_bold};
pub use summary::{print_records, print_summary};

/// Prints the migrafix banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🛠  migrafix"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Automated upgrade and test repair")
    );
}

/// Announces a pipeline state transition on stderr.
pub fn print_phase(step: usize, total: usize, title: &str) {
    eprintln!(
        "\n{}  {}",
        bright("⚙️"),
        bright(format!("[{step}/{total}] {title}")).underlined()
    );
}
