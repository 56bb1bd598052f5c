//! __VIEWSTATE 的展开和收缩
//!
//! 展开：把表单中的 __VIEWSTATE 字段移除，解码后的内容以规范的 URL 编码
//! 放到实体末尾的标记块中，方便查看和修改。
//! 收缩：从标记块中取出内容，重新编码成 base64 并作为 __VIEWSTATE 字段追加回表单。
//!
//! 展开时会对内容重新编码，所以往返之后得到的是规范编码，
//! 百分号编码的大小写等不一定和原来的一样

use std::str;

use crate::error::{DecodeError, Result};
use crate::form::FormField;
use crate::utils::{url_decode, url_encode};

/// 被展开的字段名
pub const VIEWSTATE_FIELD: &str = "__VIEWSTATE";

/// 标记块的标记
pub const EXPANSION_MARKER: &str = "[WwwProxy __VIEWSTATE Expansion]";

const SEPARATOR: &str = "\r\n\r\n";

/// 展开 __VIEWSTATE
///
/// 返回去掉该字段之后的字段，以及需要追加到重建实体末尾的标记块。
/// 字段不存在时原样返回，没有标记块。
/// 字段出现多次时全部移除，以最后一次出现的值为准
pub fn expand(fields: Vec<FormField>) -> Result<(Vec<FormField>, Option<String>)> {
    if !fields.iter().any(|f| f.name == VIEWSTATE_FIELD) {
        return Ok((fields, None));
    }

    let mut value = String::new();
    let mut remain = Vec::with_capacity(fields.len());
    for field in fields {
        if field.name == VIEWSTATE_FIELD {
            value = field.value;
        } else {
            remain.push(field);
        }
    }

    let decoded = url_decode(&value)?;
    let raw = base64::decode(&decoded).map_err(DecodeError::from)?;

    let mut trailer = String::from(SEPARATOR);
    trailer.push_str(EXPANSION_MARKER);
    trailer.push_str(SEPARATOR);
    trailer.push_str(&url_encode(&raw));

    Ok((remain, Some(trailer)))
}

/// 收缩 __VIEWSTATE
///
/// 只有实体中恰好出现一次标记的时候才进行处理，否则原样返回
pub fn contract(body: &[u8]) -> Result<Vec<u8>> {
    let text = match str::from_utf8(body) {
        Ok(text) => text,
        Err(_) => return Ok(body.to_vec()),
    };

    let parts: Vec<&str> = text.split(EXPANSION_MARKER).collect();
    if parts.len() != 2 {
        return Ok(body.to_vec());
    }

    let form = parts[0].trim_end();
    let raw = url_decode(parts[1].trim())?;
    let value = url_encode(base64::encode(&raw).as_bytes());

    let mut res = String::with_capacity(form.len() + VIEWSTATE_FIELD.len() + value.len() + 2);
    res.push_str(form);
    if !form.is_empty() {
        res.push('&');
    }
    res.push_str(VIEWSTATE_FIELD);
    res.push('=');
    res.push_str(&value);

    Ok(res.into_bytes())
}

#[test]
fn expand_test() {
    use crate::form::{parse, rebuild};

    let fields = parse(b"a=1&b=2&__VIEWSTATE=WFla").unwrap();
    let (fields, trailer) = expand(fields).unwrap();
    assert_eq!(fields, vec![FormField::new("a", "1"), FormField::new("b", "2")]);

    let mut body = rebuild(&fields);
    body.extend_from_slice(trailer.unwrap().as_bytes());
    assert_eq!(
        body,
        b"a=1&b=2\r\n\r\n[WwwProxy __VIEWSTATE Expansion]\r\n\r\nXYZ".to_vec()
    );
}

#[test]
fn expand_without_viewstate_test() {
    let fields = vec![FormField::new("a", "1"), FormField::new("__EVENTTARGET", "")];
    let (res, trailer) = expand(fields.clone()).unwrap();
    assert_eq!(res, fields);
    assert!(trailer.is_none());
}

#[test]
fn expand_invalid_test() {
    use crate::error::FilterError;

    let fields = vec![FormField::new("__VIEWSTATE", "not*base64")];
    assert!(matches!(
        expand(fields),
        Err(FilterError::Decode(DecodeError::Base64(_)))
    ));

    let fields = vec![FormField::new("__VIEWSTATE", "%G0")];
    assert!(matches!(
        expand(fields),
        Err(FilterError::Decode(DecodeError::Escape(0)))
    ));
}

#[test]
fn contract_test() {
    let body = b"a=1&b=2\r\n\r\n[WwwProxy __VIEWSTATE Expansion]\r\n\r\nXYZ";
    assert_eq!(contract(body).unwrap(), b"a=1&b=2&__VIEWSTATE=WFla".to_vec());

    // 只有 __VIEWSTATE 一个字段
    let body = b"\r\n\r\n[WwwProxy __VIEWSTATE Expansion]\r\n\r\nXYZ";
    assert_eq!(contract(body).unwrap(), b"__VIEWSTATE=WFla".to_vec());
}

#[test]
fn contract_passthrough_test() {
    let body = b"a=1&b=2".to_vec();
    assert_eq!(contract(&body).unwrap(), body);

    let body = b"a=1[WwwProxy __VIEWSTATE Expansion]x[WwwProxy __VIEWSTATE Expansion]y".to_vec();
    assert_eq!(contract(&body).unwrap(), body);

    let body = vec![0xff, 0xfe];
    assert_eq!(contract(&body).unwrap(), body);
}

#[test]
fn round_trip_test() {
    use crate::form::{parse, rebuild};

    let payloads: Vec<Vec<u8>> = vec![
        b"XYZ".to_vec(),
        vec![0xfb, 0xff],
        b"dDwtMTA4; <p>a b</p>\r\n".to_vec(),
        vec![],
        (0..=255).collect(),
    ];

    for payload in payloads {
        let canonical = url_encode(base64::encode(&payload).as_bytes());
        let original = format!("a=1&b=%2B2&{}={}", VIEWSTATE_FIELD, canonical);

        let (fields, trailer) = expand(parse(original.as_bytes()).unwrap()).unwrap();
        let mut body = rebuild(&fields);
        body.extend_from_slice(trailer.unwrap().as_bytes());

        assert_eq!(contract(&body).unwrap(), original.into_bytes());
    }
}

#[test]
fn round_trip_canonical_test() {
    use crate::form::{parse, rebuild};

    // +/8= 小写编码，往返之后变成大写的规范编码
    let (fields, trailer) = expand(parse(b"__VIEWSTATE=%2b%2f8%3d&a=1").unwrap()).unwrap();
    let mut body = rebuild(&fields);
    body.extend_from_slice(trailer.unwrap().as_bytes());
    assert_eq!(
        contract(&body).unwrap(),
        b"a=1&__VIEWSTATE=%2B%2F8%3D".to_vec()
    );
}
