//! 替换 HTML 中图片的地址

use log::debug;
use regex::bytes::{Captures, Regex};

use super::FilterUnit;
use crate::error::Result;
use crate::exchange::{Request, Response};

pub const NAME: &str = "img-src";

lazy_static! {
    static ref IMG_SRC: Regex = Regex::new(r#"(?is)(<img.*?src=['"])(.*?)(['"].*?>)"#).unwrap();
}

/// 把所有 img 标签的 src 换成同一个地址
pub struct ImgSrcFilter {
    url: Vec<u8>,
}

impl ImgSrcFilter {
    pub fn new(url: &str) -> ImgSrcFilter {
        ImgSrcFilter {
            url: url.as_bytes().to_vec(),
        }
    }
}

impl FilterUnit for ImgSrcFilter {
    fn name(&self) -> &str {
        NAME
    }

    fn pre_response(&self, request: &Request, mut response: Response) -> Result<Response> {
        // 流式响应的实体不能改动
        if !response.completable {
            return Ok(response);
        }
        if let Some(body) = &response.body {
            let replaced = IMG_SRC.replace_all(body, |caps: &Captures| {
                let mut tag = caps[1].to_vec();
                tag.extend_from_slice(&self.url);
                tag.extend_from_slice(&caps[3]);
                tag
            });
            if replaced[..] != body[..] {
                debug!("request {} image sources replaced", request.id);
                let replaced = replaced.into_owned();
                response.body = Some(replaced);
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
fn run(body: &str, completable: bool) -> Option<Vec<u8>> {
    let request = Request::new(1, "GET / HTTP/1.1", None);
    let response = Response::new(1, "HTTP/1.1 200 OK", Some(body.as_bytes().to_vec()), completable);
    ImgSrcFilter::new("http://localhost/blank.gif")
        .pre_response(&request, response)
        .unwrap()
        .body
}

#[test]
fn replace_test() {
    let body = r#"<p><IMG class="x" SRC="/a.png" alt='a'></p><img src='b.jpg'/>"#;
    assert_eq!(
        run(body, true),
        Some(
            br#"<p><IMG class="x" SRC="http://localhost/blank.gif" alt='a'></p><img src='http://localhost/blank.gif'/>"#
                .to_vec()
        )
    );
}

#[test]
fn untouched_test() {
    let body = r#"<img src="/a.png">"#;
    assert_eq!(run(body, false), Some(body.as_bytes().to_vec()));

    let body = "<p>no images</p>";
    assert_eq!(run(body, true), Some(body.as_bytes().to_vec()));
}
