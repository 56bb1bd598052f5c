//! 过滤器运行过程中的错误类型

use std::io;

/// 编解码错误
///
/// URL 编码或者 base64 编码不合法时产生
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid percent escape at byte {0}")]
    Escape(usize),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// 单个过滤单元返回的错误
///
/// 过滤链会捕获这些错误并保持该单元的输入不变
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("malformed form body: {0}")]
    MalformedBody(String),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("cookie log write failed: {0}")]
    Io(#[from] io::Error),
}

/// 原始报文解析错误
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("http content not fits the protocol definition at byte {0}")]
    Invalid(usize),

    #[error("http header is not valid UTF-8")]
    NotUtf8,
}

/// 配置相关的错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("can not open config file: {0}")]
    Open(#[source] io::Error),

    #[error("deserialize config file failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("write config file failed: {0}")]
    Write(#[source] io::Error),

    #[error("unknown filter unit `{0}`")]
    UnknownUnit(String),

    #[error("open cookie log failed: {0}")]
    Sink(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, FilterError>;
