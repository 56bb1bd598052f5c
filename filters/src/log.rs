use std::error::Error;
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config as Log4rsConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::LogConfig;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}{n}";

/// 初始化日志
///
/// 日志输出到 stderr，配置了文件的时候同时写入文件
pub fn init(config: &LogConfig) -> Result<(), Box<dyn Error>> {
    let level = LevelFilter::from_str(&config.level)
        .map_err(|_| format!("invalid log level `{}`", config.level))?;

    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();

    let mut builder =
        Log4rsConfig::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(file) = &config.file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(PATTERN)))
            .build(file)?;
        builder = builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = builder.build(root.build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

#[test]
fn invalid_level_test() {
    let config = LogConfig {
        level: "loud".to_string(),
        file: None,
    };
    assert!(init(&config).is_err());
}
