mod styling;

use styling::{dim, magenta_bold};

/// Prints the build bot banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🤖 TeamCity build bot"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("HipChat bridge for TeamCity builds")
    );
}
