//! 请求路径匹配

use crate::exchange::RequestLine;

/// 请求的资源是否以给定的后缀结尾，不区分大小写，忽略查询参数
pub fn is_static_resource(line: &RequestLine, extensions: &[String]) -> bool {
    let resource = line.resource().to_lowercase();
    extensions
        .iter()
        .any(|ext| resource.ends_with(&ext.to_lowercase()))
}

#[test]
fn is_static_resource_test() {
    let extensions = vec![".jpg".to_string(), ".CSS".to_string()];

    let line = RequestLine::parse("GET /images/logo.JPG?v=2 HTTP/1.1").unwrap();
    assert!(is_static_resource(&line, &extensions));

    let line = RequestLine::parse("GET http://a/site.css HTTP/1.1").unwrap();
    assert!(is_static_resource(&line, &extensions));

    let line = RequestLine::parse("GET /login.aspx?img=a.jpg HTTP/1.1").unwrap();
    assert!(!is_static_resource(&line, &extensions));

    assert!(!is_static_resource(&line, &[]));

    let line = RequestLine::parse("GET /a.jpg HTTP/0.9").unwrap();
    assert!(is_static_resource(&line, &extensions));
}
