//! 请求和响应头部的清理

use log::debug;

use super::path::is_static_resource;
use super::FilterUnit;
use crate::config::{Header, RequestRules, ResponseRules};
use crate::error::Result;
use crate::exchange::{Request, Response};
use crate::form::{self, looks_like_form_body};
use crate::header::{strip_header, substitute_header, trim_trailing_crlf};

pub const NAME: &str = "scrub";

/// 删除不必要的头部，替换 User-Agent，静态资源直接转发
pub struct ScrubFilter {
    request: RequestRules,
    response: ResponseRules,
}

impl ScrubFilter {
    pub fn new(request: RequestRules, response: ResponseRules) -> ScrubFilter {
        ScrubFilter { request, response }
    }

    fn rewrite_request_header(&self, header: &str) -> String {
        let mut header = header.to_string();
        for name in &self.request.strip_headers {
            header = strip_header(&header, name);
        }
        if let Some(agent) = &self.request.user_agent {
            header = substitute_header(&header, "User-Agent", agent);
        }
        for Header { key, value } in &self.request.replace_headers {
            header = substitute_header(&header, key, value);
        }
        header
    }
}

impl FilterUnit for ScrubFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn pre_request(&self, mut request: Request) -> Result<Request> {
        if let Some(line) = request.request_line() {
            request.header = self.rewrite_request_header(&request.header);

            if is_static_resource(&line, &self.request.pass_extensions) {
                debug!("pass static resource {} of request {}", line.url, request.id);
                request.pass_through = true;
                request.skip_remaining = true;
            } else if let Some(body) = &request.body {
                if looks_like_form_body(body) {
                    let fields = form::parse(body)?;
                    for field in &fields {
                        debug!("request {}: \"{}\"=\"{}\"", request.id, field.name, field.value);
                    }
                    request.body = Some(form::rebuild(&fields));
                }
            }
        }

        request.header = trim_trailing_crlf(&request.header).to_string();
        Ok(request)
    }

    fn pre_response(&self, request: &Request, mut response: Response) -> Result<Response> {
        if request.request_line().is_some() {
            for name in &self.response.strip_headers {
                response.header = strip_header(&response.header, name);
            }
        }

        response.header = trim_trailing_crlf(&response.header).to_string();
        Ok(response)
    }
}

#[cfg(test)]
fn scrub() -> ScrubFilter {
    ScrubFilter::new(RequestRules::default(), ResponseRules::default())
}

#[test]
fn pre_request_test() {
    let header = "GET /default.aspx HTTP/1.1\r\nAccept: */*\r\nAccept-Language: en-gb\r\nUser-Agent: Mozilla/5.0\r\nHost: example.org\r\nPragma: no-cache\r\n";
    let request = scrub().pre_request(Request::new(1, header, None)).unwrap();

    assert_eq!(
        request.header,
        "GET /default.aspx HTTP/1.1\r\nUser-Agent: Mozilla/4.0 (compatible; proxy-filters/1.0)\r\nHost: example.org"
    );
    assert!(!request.pass_through);
    assert!(!request.skip_remaining);
}

#[test]
fn replace_headers_test() {
    let mut rules = RequestRules::default();
    rules.user_agent = None;
    rules.replace_headers.push(Header {
        key: "Cookie".to_string(),
        value: "sid=0".to_string(),
    });
    let filter = ScrubFilter::new(rules, ResponseRules::default());

    let header = "GET / HTTP/1.1\r\nUser-Agent: curl\r\nCookie: sid=42\r\n";
    let request = filter.pre_request(Request::new(1, header, None)).unwrap();
    assert_eq!(request.header, "GET / HTTP/1.1\r\nUser-Agent: curl\r\nCookie: sid=0");
}

#[test]
fn static_resource_test() {
    let header = "GET /img/banner.GIF?x=1 HTTP/1.1\r\nHost: example.org";
    let request = scrub()
        .pre_request(Request::new(2, header, Some(b"a=1&b".to_vec())))
        .unwrap();
    assert!(request.pass_through);
    assert!(request.skip_remaining);
    // 静态资源不解析实体
    assert_eq!(request.body, Some(b"a=1&b".to_vec()));
}

#[test]
fn form_body_test() {
    use crate::error::FilterError;

    let header = "POST /login HTTP/1.1\r\nHost: example.org";
    let body = b"user=rust&pass=p%40ss".to_vec();
    let request = scrub()
        .pre_request(Request::new(3, header, Some(body.clone())))
        .unwrap();
    assert_eq!(request.body, Some(body));

    let res = scrub().pre_request(Request::new(4, header, Some(b"user=rust&remember".to_vec())));
    assert!(matches!(res, Err(FilterError::MalformedBody(_))));

    // 不像表单的实体原样保留
    let request = scrub()
        .pre_request(Request::new(5, header, Some(b"{\"user\": 1}".to_vec())))
        .unwrap();
    assert_eq!(request.body, Some(b"{\"user\": 1}".to_vec()));
}

#[test]
fn no_request_line_test() {
    let request = scrub()
        .pre_request(Request::new(6, "Accept: */*\r\n", None))
        .unwrap();
    assert_eq!(request.header, "Accept: */*");
}

#[test]
fn pre_response_test() {
    let request = Request::new(7, "GET / HTTP/1.1\r\nHost: example.org", None);
    let header = "HTTP/1.1 200 OK\r\nDate: Mon, 01 Jan 2024 00:00:00 GMT\r\nContent-Type: text/html\r\nVia: 1.1 cache\r\nX-Cache-Lookup: HIT\r\n";
    let response = scrub()
        .pre_response(&request, Response::new(7, header, None, true))
        .unwrap();
    assert_eq!(
        response.header,
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nX-Cache-Lookup: HIT"
    );
}
