use std::error::Error;

use log::LevelFilter;
use log4rs::Config;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Return the log level and message pattern used by the CLI.
///
/// Progress messages are printed as-is. Verbose output adds the level and
/// the module which logged the message.
fn log_format(verbose: bool) -> (LevelFilter, &'static str) {
    if verbose {
        (LevelFilter::Debug, "[{h({l})} - {M}] {m}{n}")
    } else {
        (LevelFilter::Info, "{m}{n}")
    }
}

/// Install a logger which writes to stderr.
///
/// Messages at `Info` level and above are shown, or `Debug` and above if
/// `verbose` is set.
pub fn init(verbose: bool) -> Result<(), Box<dyn Error>> {
    let (level, pattern) = log_format(verbose);
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();
    let appender = Appender::builder().build("stderr", Box::new(stderr));

    let config = Config::builder()
        .appender(appender)
        .build(Root::builder().appender("stderr").build(level))?;
    log4rs::init_config(config)?;

    Ok(())
}
