use percent_encoding::{percent_decode, percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::DecodeError;

// 字母数字以及 -_.!*() 不进行编码
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

/// 对字节进行 URL 编码，空格编码成 `+`，十六进制使用大写
///
/// 这是 __VIEWSTATE 展开和收缩时使用的规范编码
pub fn url_encode(bytes: &[u8]) -> String {
    // `%` 本身会被编码成 %25，所以输出中的 %20 只可能来自空格
    percent_encode(bytes, URL_ENCODE_SET)
        .to_string()
        .replace("%20", "+")
}

/// URL 解码，`+` 解码成空格
///
/// `%` 后面不是两个十六进制字符的时候返回错误
pub fn url_decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    let bytes = text.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'%') {
        let valid = matches!(
            bytes.get(i + 1..i + 3),
            Some(hex) if hex.iter().all(u8::is_ascii_hexdigit)
        );
        if !valid {
            return Err(DecodeError::Escape(i));
        }
    }

    let plus: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    Ok(percent_decode(&plus).collect())
}

#[test]
fn url_encode_test() {
    assert_eq!(url_encode(b"abc-_.!*()"), "abc-_.!*()");
    assert_eq!(url_encode(b"a b"), "a+b");
    assert_eq!(url_encode(b"+/="), "%2B%2F%3D");
    assert_eq!(url_encode(b"100% 20"), "100%25+20");
    assert_eq!(url_encode(&[0x00, 0xff]), "%00%FF");
}

#[test]
fn url_decode_test() {
    assert_eq!(url_decode("a+b%2b%2F").unwrap(), b"a b+/".to_vec());
    assert_eq!(url_decode("%2541").unwrap(), b"%41".to_vec());
    assert_eq!(url_decode("%00%FF").unwrap(), vec![0x00, 0xff]);

    assert!(matches!(url_decode("abc%"), Err(DecodeError::Escape(3))));
    assert!(matches!(url_decode("%zz"), Err(DecodeError::Escape(0))));
    assert!(matches!(url_decode("%4"), Err(DecodeError::Escape(0))));
}
