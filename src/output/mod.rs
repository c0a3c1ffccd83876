mod status;
mod styling;
mod tables;

pub use status::print_status;
use styling::{dim, magenta_bold};

/// Prints the `CILens Hooks` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🪝 CILens Hooks"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("GitHub Actions webhook receiver")
    );
}
