use log::debug;

use super::FilterUnit;
use crate::error::Result;
use crate::exchange::Request;
use crate::form::{self, looks_like_form_body};
use crate::viewstate::{contract, expand, EXPANSION_MARKER};

pub const NAME: &str = "viewstate";

/// 发出请求之前展开 __VIEWSTATE，请求发出之后再收缩回去
pub struct ViewStateFilter;

fn contains_marker(body: &[u8]) -> bool {
    let marker = EXPANSION_MARKER.as_bytes();
    body.windows(marker.len()).any(|w| w == marker)
}

impl FilterUnit for ViewStateFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn pre_request(&self, mut request: Request) -> Result<Request> {
        let body = match &request.body {
            Some(body) if looks_like_form_body(body) => body,
            _ => return Ok(request),
        };
        // 已经展开过的实体不再展开
        if contains_marker(body) {
            debug!("request {} already carries an expansion block", request.id);
            return Ok(request);
        }

        let (fields, trailer) = expand(form::parse(body)?)?;
        if let Some(trailer) = trailer {
            let mut body = form::rebuild(&fields);
            body.extend_from_slice(trailer.as_bytes());
            debug!("request {} __VIEWSTATE expanded:{}", request.id, trailer);
            request.body = Some(body);
        }
        Ok(request)
    }

    fn post_request(&self, mut request: Request) -> Result<Request> {
        if let Some(body) = &request.body {
            let contracted = contract(body)?;
            if &contracted != body {
                debug!("request {} __VIEWSTATE contracted", request.id);
                request.body = Some(contracted);
            }
        }
        Ok(request)
    }
}

#[test]
fn expand_contract_test() {
    let header = "POST /default.aspx HTTP/1.1\r\nHost: example.org";
    let body = b"a=1&b=2&__VIEWSTATE=WFla".to_vec();

    let request = ViewStateFilter
        .pre_request(Request::new(1, header, Some(body)))
        .unwrap();
    let expanded = request.body.clone().unwrap();
    assert!(expanded.ends_with(b"\r\n\r\n[WwwProxy __VIEWSTATE Expansion]\r\n\r\nXYZ"));
    assert!(expanded.starts_with(b"a=1&b=2\r\n"));

    // 再次展开不会产生第二个标记块
    let again = ViewStateFilter.pre_request(request.clone()).unwrap();
    assert_eq!(again.body, Some(expanded));

    let request = ViewStateFilter.post_request(request).unwrap();
    assert_eq!(request.body, Some(b"a=1&b=2&__VIEWSTATE=WFla".to_vec()));
}

#[test]
fn untouched_test() {
    let header = "POST / HTTP/1.1";

    for body in vec![None, Some(b"a=1&b=2".to_vec()), Some(b"<xml/>".to_vec())] {
        let request = Request::new(2, header, body.clone());
        let request = ViewStateFilter.pre_request(request).unwrap();
        assert_eq!(request.body, body);
        let request = ViewStateFilter.post_request(request).unwrap();
        assert_eq!(request.body, body);
    }
}

#[test]
fn decode_error_test() {
    use crate::error::FilterError;

    let request = Request::new(3, "POST / HTTP/1.1", Some(b"a=1&__VIEWSTATE=%%%".to_vec()));
    assert!(matches!(
        ViewStateFilter.pre_request(request),
        Err(FilterError::Decode(_))
    ));
}
