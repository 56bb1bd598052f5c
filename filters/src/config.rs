//! config.rs 负责配置文件的读取，以及默认配置文件的生成

use std::fs::{self, File};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{self, Result as JsonResult};
use serde_yaml;

use crate::error::ConfigError;

/// 默认的配置文件
pub const FILENAME: &str = "config.yml";

/// 配置文件内容
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    /// 过滤单元的名称，按照加载顺序排列
    pub chain: Vec<String>,
    pub request: RequestRules,
    pub response: ResponseRules,
    pub cookies: CookieConfig,
    pub img_src: ImgSrcConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// 为空的时候只输出到终端
    pub file: Option<String>,
}

/// 请求方向的头部规则
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RequestRules {
    pub strip_headers: Vec<String>,
    pub user_agent: Option<String>,
    pub replace_headers: Vec<Header>,
    /// 这些后缀的资源直接转发，不再交给后面的过滤单元
    pub pass_extensions: Vec<String>,
}

/// 响应方向的头部规则
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ResponseRules {
    pub strip_headers: Vec<String>,
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CookieConfig {
    pub file: String,
    /// 只记录 host 包含该字符串的请求
    pub host: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImgSrcConfig {
    pub url: String,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log: LogConfig::default(),
            chain: strings(&["scrub", "viewstate"]),
            request: RequestRules::default(),
            response: ResponseRules::default(),
            cookies: CookieConfig::default(),
            img_src: ImgSrcConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Default for RequestRules {
    fn default() -> Self {
        RequestRules {
            strip_headers: strings(&[
                "Accept",
                "Accept-Language",
                "UA-CPU",
                "Cache-Control",
                "If-Modified-Since",
                "Pragma",
            ]),
            user_agent: Some("Mozilla/4.0 (compatible; proxy-filters/1.0)".to_string()),
            replace_headers: Vec::new(),
            pass_extensions: strings(&[".bmp", ".gif", ".ico", ".jpg", ".png", ".css", ".js"]),
        }
    }
}

impl Default for ResponseRules {
    fn default() -> Self {
        ResponseRules {
            strip_headers: strings(&[
                "Via",
                "X-Cache",
                "Age",
                "Cache-Control",
                "Date",
                "Expires",
                "Last-Modified",
            ]),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        CookieConfig {
            file: "Cookies.txt".to_string(),
            host: None,
        }
    }
}

impl Default for ImgSrcConfig {
    fn default() -> Self {
        ImgSrcConfig {
            url: "http://localhost/blank.gif".to_string(),
        }
    }
}

impl Config {
    /// 从配置文件中读取内容
    pub fn parse<P: AsRef<Path>>(filepath: P) -> Result<Config, ConfigError> {
        let f = File::open(filepath).map_err(ConfigError::Open)?;
        let config: Config = serde_yaml::from_reader(f)?;
        Ok(config)
    }

    /// 生成默认的配置文件
    pub fn generate_default<P: AsRef<Path>>(filepath: P) -> Result<Config, ConfigError> {
        let default_config = Config::default();

        // 结构体转换成对应的字符串
        let str = serde_yaml::to_string(&default_config)?;
        fs::write(filepath, str).map_err(ConfigError::Write)?;

        Ok(default_config)
    }

    pub fn to_json(&self) -> JsonResult<String> {
        serde_json::to_string_pretty(self)
    }
}

#[test]
fn parse_config_test() {
    assert!(matches!(
        Config::parse("test/not_exist.yml"),
        Err(ConfigError::Open(_))
    ));

    let config = Config::parse("test/config.yml").unwrap();
    assert_eq!(config.chain, vec!["trace", "scrub", "viewstate", "cookies"]);
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.request.strip_headers, vec!["Accept", "Accept-Language"]);
    assert_eq!(config.request.user_agent, Some("rust-proxy".to_string()));
    assert_eq!(config.request.replace_headers[0].key, "Cookie");
    assert_eq!(config.cookies.host, Some("example.org".to_string()));

    // 没有写出来的部分使用默认值
    assert_eq!(config.response, ResponseRules::default());
    assert_eq!(config.img_src, ImgSrcConfig::default());
}

#[test]
fn generate_default_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(FILENAME);

    let config = Config::generate_default(&path).unwrap();
    assert_eq!(Config::parse(&path).unwrap(), config);
    assert!(config.to_json().unwrap().contains("\"pass_extensions\""));
}

#[test]
fn invalid_config_test() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yml");
    fs::write(&path, "chain: [scrub\n").unwrap();
    assert!(matches!(Config::parse(&path), Err(ConfigError::Yaml(_))));
}
