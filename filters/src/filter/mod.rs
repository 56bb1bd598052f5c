use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::config::Config;
use crate::cookie::CookieLog;
use crate::error::{ConfigError, Result};
use crate::exchange::{Request, Response};

mod chain;
mod cookies;
mod img;
mod path;
mod scrub;
mod trace;
mod viewstate;

pub use chain::{ChainObserver, FilterChain, LogObserver};
pub use cookies::CookieFilter;
pub use img::ImgSrcFilter;
pub use scrub::ScrubFilter;
pub use trace::TraceFilter;
pub use viewstate::ViewStateFilter;

/// 过滤阶段
///
/// 同一次交互的四个阶段依次执行，不会并发
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PreRequest,
    PostRequest,
    PreResponse,
    PostResponse,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Stage::PreRequest => "pre_request",
            Stage::PostRequest => "post_request",
            Stage::PreResponse => "pre_response",
            Stage::PostResponse => "post_response",
        };
        write!(f, "{}", name)
    }
}

/// 过滤单元
///
/// 四个阶段的默认实现都不做任何修改。
/// 同一个单元会被多个交互同时调用，所以只能通过 &self 访问，
/// 需要可变的共享状态时自行加锁
pub trait FilterUnit: Send + Sync {
    fn name(&self) -> &str;

    /// 请求交给代理引擎之前
    fn pre_request(&self, request: Request) -> Result<Request> {
        Ok(request)
    }

    /// 代理引擎报告请求已经发出
    fn post_request(&self, request: Request) -> Result<Request> {
        Ok(request)
    }

    /// 收到响应之后
    fn pre_response(&self, _request: &Request, response: Response) -> Result<Response> {
        Ok(response)
    }

    fn post_response(&self, _request: &Request, response: Response) -> Result<Response> {
        Ok(response)
    }
}

/// 根据名称创建过滤单元
pub fn build(name: &str, config: &Config) -> std::result::Result<Box<dyn FilterUnit>, ConfigError> {
    let unit: Box<dyn FilterUnit> = match name {
        trace::NAME => Box::new(TraceFilter),
        scrub::NAME => Box::new(ScrubFilter::new(
            config.request.clone(),
            config.response.clone(),
        )),
        viewstate::NAME => Box::new(ViewStateFilter),
        cookies::NAME => {
            let sink = CookieLog::open(&config.cookies.file).map_err(ConfigError::Sink)?;
            Box::new(CookieFilter::new(Arc::new(sink), config.cookies.host.clone()))
        }
        img::NAME => Box::new(ImgSrcFilter::new(&config.img_src.url)),
        _ => return Err(ConfigError::UnknownUnit(name.to_string())),
    };
    Ok(unit)
}

#[test]
fn build_test() {
    let config = Config::default();
    for name in &["trace", "scrub", "viewstate", "img-src"] {
        assert_eq!(build(name, &config).unwrap().name(), *name);
    }
    assert!(matches!(
        build("clean", &config),
        Err(ConfigError::UnknownUnit(_))
    ));
}

#[test]
fn build_cookies_test() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.cookies.file = dir.path().join("Cookies.txt").to_string_lossy().to_string();
    assert_eq!(build("cookies", &config).unwrap().name(), "cookies");

    config.cookies.file = dir.path().join("missing/Cookies.txt").to_string_lossy().to_string();
    assert!(matches!(build("cookies", &config), Err(ConfigError::Sink(_))));
}

#[test]
fn scrub_viewstate_chain_test() {
    let chain = FilterChain::from_config(&Config::default()).unwrap();
    assert_eq!(chain.names(), vec!["scrub", "viewstate"]);

    let header = "POST /default.aspx HTTP/1.1\r\nHost: example.org\r\nAccept: */*\r\nContent-Length: 24\r\n";
    let body = b"a=1&b=2&__VIEWSTATE=WFla".to_vec();
    let request = chain.run_pre_request(Request::new(1, header, Some(body)));

    let expanded = request.body.clone().unwrap();
    assert!(expanded.starts_with(b"a=1&b=2\r\n\r\n[WwwProxy __VIEWSTATE Expansion]"));
    assert!(!request.header.contains("Accept"));
    assert!(String::from_utf8_lossy(&request.complete())
        .contains(&format!("Content-Length: {}\r\n\r\n", expanded.len())));

    let request = chain.run_post_request(request);
    assert_eq!(request.body, Some(b"a=1&b=2&__VIEWSTATE=WFla".to_vec()));
}
