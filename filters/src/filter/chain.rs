//! 过滤链
//!
//! 按照注册顺序依次调用每个过滤单元，前一个单元的输出是后一个单元的输入。
//!
//! 失败策略是 fail-open：某个单元返回错误或者 panic 时，记录日志，
//! 当作这个单元没有做任何修改，继续执行后面的单元。这样一个有问题的单元
//! 不会让整个代理不可用，代价是这次交互中该单元的改写被跳过。

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};

use super::{build, FilterUnit, Stage};
use crate::config::Config;
use crate::error::{ConfigError, FilterError};
use crate::exchange::{Request, Response};

/// 过滤链的观察者，用于记录单元失败和跳过的情况
pub trait ChainObserver: Send + Sync {
    fn unit_failed(&self, stage: Stage, unit: &str, id: u64, reason: &str);

    fn units_skipped(&self, _stage: Stage, _unit: &str, _id: u64) {}
}

/// 将过滤链的事件写入日志
pub struct LogObserver;

impl ChainObserver for LogObserver {
    fn unit_failed(&self, stage: Stage, unit: &str, id: u64, reason: &str) {
        error!(
            "filter `{}` failed in {} of request {}, left unmodified: {}",
            unit, stage, id, reason
        );
    }

    fn units_skipped(&self, stage: Stage, unit: &str, id: u64) {
        debug!("{} of request {} skipped from filter `{}`", stage, id, unit);
    }
}

// 请求和响应共有的字段
trait Exchange: Clone {
    fn id(&self) -> u64;
    fn pass_through(&self) -> bool;
    fn set_pass_through(&mut self);
    fn skip_remaining(&self) -> bool;
    fn clear_skip(&mut self);
}

impl Exchange for Request {
    fn id(&self) -> u64 {
        self.id
    }
    fn pass_through(&self) -> bool {
        self.pass_through
    }
    fn set_pass_through(&mut self) {
        self.pass_through = true;
    }
    fn skip_remaining(&self) -> bool {
        self.skip_remaining
    }
    fn clear_skip(&mut self) {
        self.skip_remaining = false;
    }
}

impl Exchange for Response {
    fn id(&self) -> u64 {
        self.id
    }
    fn pass_through(&self) -> bool {
        self.pass_through
    }
    fn set_pass_through(&mut self) {
        self.pass_through = true;
    }
    fn skip_remaining(&self) -> bool {
        self.skip_remaining
    }
    fn clear_skip(&mut self) {
        self.skip_remaining = false;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return format!("panicked: {}", s);
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return format!("panicked: {}", s);
    }
    "panicked".to_string()
}

/// 过滤链
///
/// 启动的时候创建一次，之后被所有交互共享
pub struct FilterChain {
    units: Vec<Box<dyn FilterUnit>>,
    observer: Box<dyn ChainObserver>,
}

impl Default for FilterChain {
    fn default() -> Self {
        FilterChain::new()
    }
}

impl FilterChain {
    pub fn new() -> FilterChain {
        FilterChain::with_observer(Box::new(LogObserver))
    }

    pub fn with_observer(observer: Box<dyn ChainObserver>) -> FilterChain {
        FilterChain {
            units: Vec::new(),
            observer,
        }
    }

    /// 按照配置中的顺序创建过滤链
    pub fn from_config(config: &Config) -> Result<FilterChain, ConfigError> {
        let mut chain = FilterChain::new();
        for name in &config.chain {
            chain.push(build(name, config)?);
        }
        Ok(chain)
    }

    // 添加过滤单元，添加的顺序就是调用的顺序
    pub fn push(&mut self, unit: Box<dyn FilterUnit>) {
        self.units.push(unit);
    }

    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name()).collect()
    }

    pub fn run_pre_request(&self, request: Request) -> Request {
        self.run(Stage::PreRequest, request, |unit, r| unit.pre_request(r))
    }

    pub fn run_post_request(&self, request: Request) -> Request {
        self.run(Stage::PostRequest, request, |unit, r| unit.post_request(r))
    }

    pub fn run_pre_response(&self, request: &Request, mut response: Response) -> Response {
        if request.pass_through {
            response.pass_through = true;
        }
        self.run(Stage::PreResponse, response, |unit, r| {
            unit.pre_response(request, r)
        })
    }

    pub fn run_post_response(&self, request: &Request, mut response: Response) -> Response {
        if request.pass_through {
            response.pass_through = true;
        }
        self.run(Stage::PostResponse, response, |unit, r| {
            unit.post_response(request, r)
        })
    }

    fn run<T, F>(&self, stage: Stage, mut value: T, call: F) -> T
    where
        T: Exchange,
        F: Fn(&dyn FilterUnit, T) -> Result<T, FilterError>,
    {
        // skip_remaining 只对当前阶段有效
        value.clear_skip();
        let id = value.id();
        let mut pass = value.pass_through();

        for unit in &self.units {
            if value.skip_remaining() {
                self.observer.units_skipped(stage, unit.name(), id);
                break;
            }

            let snapshot = value.clone();
            let res = panic::catch_unwind(AssertUnwindSafe(|| call(&**unit, value)));
            value = match res {
                Ok(Ok(v)) if v.id() == id => v,
                Ok(Ok(_)) => {
                    self.observer
                        .unit_failed(stage, unit.name(), id, "exchange id was changed");
                    snapshot
                }
                Ok(Err(err)) => {
                    self.observer
                        .unit_failed(stage, unit.name(), id, &err.to_string());
                    snapshot
                }
                Err(payload) => {
                    self.observer
                        .unit_failed(stage, unit.name(), id, &panic_message(payload.as_ref()));
                    snapshot
                }
            };

            // pass_through 一旦设置就不会被清除
            pass |= value.pass_through();
            if pass {
                value.set_pass_through();
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::Result;

    type Calls = Arc<Mutex<Vec<String>>>;

    // 记录每次调用，并且可以在 pre_request 中设置标记或者失败
    struct Probe {
        name: &'static str,
        calls: Calls,
        skip: bool,
        pass: bool,
        fail: bool,
        panic: bool,
    }

    impl Probe {
        fn new(name: &'static str, calls: &Calls) -> Probe {
            Probe {
                name,
                calls: Arc::clone(calls),
                skip: false,
                pass: false,
                fail: false,
                panic: false,
            }
        }

        fn record(&self, stage: &str) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}.{}", self.name, stage));
        }
    }

    impl FilterUnit for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn pre_request(&self, mut request: Request) -> Result<Request> {
            self.record("pre_request");
            request.header.push_str(&format!("\r\nX-{}: 1", self.name));
            if self.panic {
                panic!("probe {} exploded", self.name);
            }
            if self.fail {
                return Err(FilterError::MalformedBody("probe".to_string()));
            }
            request.skip_remaining |= self.skip;
            request.pass_through = self.pass;
            Ok(request)
        }

        fn post_request(&self, request: Request) -> Result<Request> {
            self.record("post_request");
            Ok(request)
        }

        fn pre_response(&self, _request: &Request, mut response: Response) -> Result<Response> {
            self.record("pre_response");
            response.skip_remaining |= self.skip;
            Ok(response)
        }

        fn post_response(&self, _request: &Request, response: Response) -> Result<Response> {
            self.record("post_response");
            Ok(response)
        }
    }

    #[derive(Default)]
    struct Recorder {
        failures: Mutex<Vec<String>>,
    }

    impl ChainObserver for Arc<Recorder> {
        fn unit_failed(&self, stage: Stage, unit: &str, id: u64, reason: &str) {
            self.failures
                .lock()
                .unwrap()
                .push(format!("{} {} {} {}", stage, unit, id, reason));
        }
    }

    fn calls(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[test]
    fn pipeline_order_test() {
        let log = Calls::default();
        let mut chain = FilterChain::new();
        chain.push(Box::new(Probe::new("A", &log)));
        chain.push(Box::new(Probe::new("B", &log)));
        assert_eq!(chain.names(), vec!["A", "B"]);

        let request = chain.run_pre_request(Request::new(7, "GET / HTTP/1.1", None));
        assert_eq!(request.header, "GET / HTTP/1.1\r\nX-A: 1\r\nX-B: 1");
        assert_eq!(calls(&log), vec!["A.pre_request", "B.pre_request"]);
    }

    #[test]
    fn skip_remaining_test() {
        let log = Calls::default();
        let mut a = Probe::new("A", &log);
        a.skip = true;

        let mut chain = FilterChain::new();
        chain.push(Box::new(a));
        chain.push(Box::new(Probe::new("B", &log)));
        chain.push(Box::new(Probe::new("C", &log)));

        let request = chain.run_pre_request(Request::new(1, "GET / HTTP/1.1", None));
        assert!(request.skip_remaining);
        let request = chain.run_post_request(request);
        assert!(!request.skip_remaining);

        assert_eq!(
            calls(&log),
            vec![
                "A.pre_request",
                "A.post_request",
                "B.post_request",
                "C.post_request"
            ]
        );

        // 响应阶段同样只影响当前阶段
        log.lock().unwrap().clear();
        let response = chain.run_pre_response(&request, Response::new(1, "HTTP/1.1 200 OK", None, true));
        chain.run_post_response(&request, response);
        assert_eq!(
            calls(&log),
            vec![
                "A.pre_response",
                "A.post_response",
                "B.post_response",
                "C.post_response"
            ]
        );
    }

    #[test]
    fn pass_through_sticky_test() {
        let log = Calls::default();
        let mut a = Probe::new("A", &log);
        a.pass = true;

        let mut chain = FilterChain::new();
        chain.push(Box::new(a));
        // B 会把 pass_through 设为 false
        chain.push(Box::new(Probe::new("B", &log)));

        let request = chain.run_pre_request(Request::new(1, "GET / HTTP/1.1", None));
        assert!(request.pass_through);
        // pass_through 不会阻止后面的单元
        assert_eq!(calls(&log), vec!["A.pre_request", "B.pre_request"]);

        let request = chain.run_post_request(request);
        assert!(request.pass_through);

        let response = chain.run_pre_response(&request, Response::new(1, "HTTP/1.1 200 OK", None, true));
        assert!(response.pass_through);
    }

    #[test]
    fn fail_open_test() {
        let log = Calls::default();
        let recorder = Arc::new(Recorder::default());

        let mut b = Probe::new("B", &log);
        b.fail = true;
        let mut c = Probe::new("C", &log);
        c.panic = true;

        let mut chain = FilterChain::with_observer(Box::new(Arc::clone(&recorder)));
        chain.push(Box::new(Probe::new("A", &log)));
        chain.push(Box::new(b));
        chain.push(Box::new(c));
        chain.push(Box::new(Probe::new("D", &log)));

        let request = chain.run_pre_request(Request::new(3, "GET / HTTP/1.1", None));
        // B 和 C 的修改被丢弃
        assert_eq!(request.header, "GET / HTTP/1.1\r\nX-A: 1\r\nX-D: 1");
        assert_eq!(
            calls(&log),
            vec!["A.pre_request", "B.pre_request", "C.pre_request", "D.pre_request"]
        );

        let failures = recorder.failures.lock().unwrap();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("pre_request B 3 malformed form body"));
        assert!(failures[1].contains("probe C exploded"));
    }

    #[test]
    fn id_is_stable_test() {
        struct Renumber;
        impl FilterUnit for Renumber {
            fn name(&self) -> &str {
                "renumber"
            }
            fn pre_request(&self, mut request: Request) -> Result<Request> {
                request.id += 1;
                request.header.clear();
                Ok(request)
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mut chain = FilterChain::with_observer(Box::new(Arc::clone(&recorder)));
        chain.push(Box::new(Renumber));

        let request = chain.run_pre_request(Request::new(5, "GET / HTTP/1.1", None));
        assert_eq!(request.id, 5);
        assert_eq!(request.header, "GET / HTTP/1.1");
        assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_exchanges_test() {
        use std::thread;

        let log = Calls::default();
        let mut chain = FilterChain::new();
        chain.push(Box::new(Probe::new("A", &log)));
        chain.push(Box::new(Probe::new("B", &log)));
        let chain = Arc::new(chain);

        let handles: Vec<_> = (0..8u64)
            .map(|id| {
                let chain = Arc::clone(&chain);
                thread::spawn(move || {
                    let request = chain.run_pre_request(Request::new(id, "GET / HTTP/1.1", None));
                    let request = chain.run_post_request(request);
                    let response = chain.run_pre_response(&request, Response::new(id, "HTTP/1.1 200 OK", None, true));
                    let response = chain.run_post_response(&request, response);
                    (request, response)
                })
            })
            .collect();

        for (id, handle) in handles.into_iter().enumerate() {
            let (request, response) = handle.join().unwrap();
            assert_eq!(request.id, id as u64);
            assert_eq!(response.id, id as u64);
            assert_eq!(request.header, "GET / HTTP/1.1\r\nX-A: 1\r\nX-B: 1");
        }
        assert_eq!(calls(&log).len(), 8 * 8);
    }

    #[test]
    fn from_config_test() {
        let mut config = Config::default();
        config.chain = vec!["trace".to_string(), "scrub".to_string()];
        let chain = FilterChain::from_config(&config).unwrap();
        assert_eq!(chain.names(), vec!["trace", "scrub"]);

        config.chain.push("nope".to_string());
        assert!(matches!(
            FilterChain::from_config(&config),
            Err(ConfigError::UnknownUnit(_))
        ));
    }
}
