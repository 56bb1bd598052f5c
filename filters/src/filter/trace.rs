use log::info;

use super::{FilterUnit, Stage};
use crate::error::Result;
use crate::exchange::{Request, Response};

pub const NAME: &str = "trace";

/// 只记录日志，不修改任何内容
pub struct TraceFilter;

fn summary(request: &Request) -> String {
    match request.request_line() {
        Some(line) => format!("{} {}", line.method, line.url),
        None => "<no request line>".to_string(),
    }
}

impl FilterUnit for TraceFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn pre_request(&self, request: Request) -> Result<Request> {
        info!("[{}] {}: {}", request.id, Stage::PreRequest, summary(&request));
        Ok(request)
    }

    fn post_request(&self, request: Request) -> Result<Request> {
        info!("[{}] {}: {}", request.id, Stage::PostRequest, summary(&request));
        Ok(request)
    }

    fn pre_response(&self, request: &Request, response: Response) -> Result<Response> {
        info!(
            "[{}] {}: {} completable={}",
            response.id,
            Stage::PreResponse,
            summary(request),
            response.completable
        );
        Ok(response)
    }

    fn post_response(&self, request: &Request, response: Response) -> Result<Response> {
        info!("[{}] {}: {}", response.id, Stage::PostResponse, summary(request));
        Ok(response)
    }
}

#[test]
fn trace_test() {
    let request = Request::new(9, "GET /index.html HTTP/1.1\r\nHost: a", Some(b"x".to_vec()));
    assert_eq!(summary(&request), "GET /index.html");
    assert_eq!(TraceFilter.pre_request(request.clone()).unwrap(), request);

    let response = Response::new(9, "HTTP/1.1 200 OK", None, false);
    assert_eq!(
        TraceFilter.post_response(&request, response.clone()).unwrap(),
        response
    );
}
