//! application/x-www-form-urlencoded 实体的解析和重建
//!
//! 字段的值作为不透明的字符串处理，不会进行 URL 解码或者重新编码，
//! 所以未修改的实体解析之后再重建能够得到完全一样的字节

use std::str;

use regex::Regex;

use crate::error::{FilterError, Result};

lazy_static! {
    static ref FORM_BODY: Regex = Regex::new(r"^.+=.+").unwrap();
}

/// 表单中的一个字段 name=value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl FormField {
    pub fn new(name: &str, value: &str) -> FormField {
        FormField {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// 粗略判断实体是否为表单数据
///
/// 第一行中存在一个 `=`，并且两边都有内容；不满足的实体原样转发
pub fn looks_like_form_body(body: &[u8]) -> bool {
    match str::from_utf8(body) {
        Ok(text) => FORM_BODY.is_match(text),
        Err(_) => false,
    }
}

/// 解析表单实体，保持字段的顺序
///
/// 以 `&` 切分，每一段在第一个 `=` 处切分成名称和值，
/// 没有 `=` 的段会返回 MalformedBody
pub fn parse(body: &[u8]) -> Result<Vec<FormField>> {
    let text = str::from_utf8(body)
        .map_err(|_| FilterError::MalformedBody("body is not valid UTF-8".to_string()))?;

    text.split('&')
        .map(|segment| match segment.find('=') {
            Some(i) => Ok(FormField::new(&segment[..i], &segment[i + 1..])),
            None => Err(FilterError::MalformedBody(format!(
                "segment `{}` has no `=`",
                segment
            ))),
        })
        .collect()
}

/// 将字段重新拼接成实体，`&` 分隔，末尾没有 `&`
pub fn rebuild(fields: &[FormField]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i != 0 {
            buf.push(b'&');
        }
        buf.extend_from_slice(field.name.as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(field.value.as_bytes());
    }
    buf
}

#[test]
fn looks_like_form_body_test() {
    assert!(looks_like_form_body(b"a=1&b=2"));
    assert!(looks_like_form_body(b"a=1"));
    assert!(!looks_like_form_body(b"=1"));
    assert!(!looks_like_form_body(b"a="));
    assert!(!looks_like_form_body(b"{\"a\": 1}"));
    assert!(!looks_like_form_body(b"a\n=1"));
    assert!(!looks_like_form_body(&[0xff, b'=', 0xfe]));
}

#[test]
fn parse_test() {
    let fields = parse(b"user=rust&pass=pr%3Dxy&empty=&q=a=b").unwrap();
    assert_eq!(
        fields,
        vec![
            FormField::new("user", "rust"),
            FormField::new("pass", "pr%3Dxy"),
            FormField::new("empty", ""),
            FormField::new("q", "a=b"),
        ]
    );

    match parse(b"a=1&flag&b=2") {
        Err(FilterError::MalformedBody(reason)) => assert!(reason.contains("flag")),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(parse(b"a=1&").is_err());
}

#[test]
fn rebuild_test() {
    let body = b"b=2&a=%2B1&c=".to_vec();
    let fields = parse(&body).unwrap();
    assert_eq!(rebuild(&fields), body);

    let fields = vec![FormField::new("x", "1"), FormField::new("y", "2")];
    assert_eq!(parse(&rebuild(&fields)).unwrap(), fields);
    assert_eq!(rebuild(&[]), b"".to_vec());
}
