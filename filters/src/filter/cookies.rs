use std::sync::Arc;

use log::debug;

use super::FilterUnit;
use crate::cookie::{CookieEvent, CookieSink};
use crate::error::Result;
use crate::exchange::{Request, Response};
use crate::header::search_header;

pub const NAME: &str = "cookies";

/// 记录响应中的 Set-Cookie
pub struct CookieFilter {
    sink: Arc<dyn CookieSink>,
    host: Option<String>,
}

impl CookieFilter {
    /// host 不为空的时候只记录 Host 包含该字符串的请求
    pub fn new(sink: Arc<dyn CookieSink>, host: Option<String>) -> CookieFilter {
        CookieFilter { sink, host }
    }

    fn event(&self, request: &Request, response: &Response) -> Option<CookieEvent> {
        let line = request.request_line()?;
        let host = search_header(&request.header, "Host")?.split_whitespace().next()?;
        if let Some(filter) = &self.host {
            if !host.contains(filter.as_str()) {
                return None;
            }
        }
        let cookie = search_header(&response.header, "Set-Cookie")?;

        Some(CookieEvent {
            host: host.to_string(),
            url: line.url,
            cookie: cookie.to_string(),
        })
    }
}

impl FilterUnit for CookieFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn pre_response(&self, request: &Request, response: Response) -> Result<Response> {
        if let Some(event) = self.event(request, &response) {
            debug!("request {} set cookie on {}", request.id, event.host);
            self.sink.append(&event)?;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Memory {
        lines: Mutex<Vec<String>>,
    }

    impl CookieSink for Memory {
        fn append(&self, event: &CookieEvent) -> io::Result<()> {
            self.lines.lock().unwrap().push(event.to_line());
            Ok(())
        }
    }

    struct Broken;

    impl CookieSink for Broken {
        fn append(&self, _event: &CookieEvent) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    const REQUEST: &str = "GET /account?tab=1 HTTP/1.1\r\nHost: www.example.org \r\nCookie: a=1";
    const RESPONSE: &str = "HTTP/1.1 200 OK\r\nset-cookie: sid=42; path=/\r\nSet-Cookie: lang=en";

    #[test]
    fn pre_response_test() {
        let memory = Arc::new(Memory::default());
        let filter = CookieFilter::new(memory.clone(), None);

        let request = Request::new(1, REQUEST, None);
        let response = Response::new(1, RESPONSE, None, true);
        let res = filter.pre_response(&request, response.clone()).unwrap();
        assert_eq!(res, response);

        assert_eq!(
            *memory.lines.lock().unwrap(),
            vec!["\"www.example.org\" \"/account?tab=1\" Set-Cookie: \"sid=42; path=/\"\n"]
        );
    }

    #[test]
    fn host_filter_test() {
        let memory = Arc::new(Memory::default());
        let filter = CookieFilter::new(memory.clone(), Some("google".to_string()));

        let request = Request::new(1, REQUEST, None);
        filter
            .pre_response(&request, Response::new(1, RESPONSE, None, true))
            .unwrap();
        assert!(memory.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_parts_test() {
        let memory = Arc::new(Memory::default());
        let filter = CookieFilter::new(memory.clone(), None);

        // 没有 Set-Cookie
        let request = Request::new(1, REQUEST, None);
        filter
            .pre_response(&request, Response::new(1, "HTTP/1.1 304 Not Modified", None, true))
            .unwrap();

        // 没有 Host
        let request = Request::new(2, "GET / HTTP/1.1", None);
        filter
            .pre_response(&request, Response::new(2, RESPONSE, None, true))
            .unwrap();

        assert!(memory.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn sink_error_test() {
        use crate::error::FilterError;

        let filter = CookieFilter::new(Arc::new(Broken), None);
        let request = Request::new(1, REQUEST, None);
        let res = filter.pre_response(&request, Response::new(1, RESPONSE, None, true));
        assert!(matches!(res, Err(FilterError::Io(_))));
    }
}
