//! 头部改写
//!
//! 对原始头部文本按行进行处理，行之间以 CRLF 分隔，头部名称不区分大小写。
//! 头部名称必须紧跟冒号才算匹配，`Accept` 不会匹配 `Accept-Language: ...`

/// 将头部文本切分成 (内容, 行结束符)
///
/// 行结束符可能是 `\r\n`、`\n`、`\r`，最后一行可能没有结束符
fn lines(text: &str) -> Vec<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut res = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                let end = if bytes.get(i + 1) == Some(&b'\n') { i + 2 } else { i + 1 };
                res.push((&text[start..i], &text[i..end]));
                start = end;
                i = end;
            }
            b'\n' => {
                res.push((&text[start..i], &text[i..i + 1]));
                start = i + 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        res.push((&text[start..], ""));
    }
    res
}

// 如果该行是名为 name 的头部，返回值的起始位置(跳过冒号后面的空白)
fn value_start(line: &str, name: &str) -> Option<usize> {
    if name.is_empty() || line.as_bytes().get(name.len()) != Some(&b':') {
        return None;
    }
    match line.get(..name.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(name) => {}
        _ => return None,
    }
    let rest = &line[name.len() + 1..];
    let ws = rest.len() - rest.trim_start_matches(|c| c == ' ' || c == '\t').len();
    Some(name.len() + 1 + ws)
}

/// 删除所有名为 name 的头部行(包括行结束符)，不存在时原样返回
pub fn strip_header(text: &str, name: &str) -> String {
    let mut res = String::with_capacity(text.len());
    for (line, end) in lines(text) {
        if value_start(line, name).is_some() {
            continue;
        }
        res.push_str(line);
        res.push_str(end);
    }
    res
}

/// 替换名为 name 的头部的值，保留原有的行结束符
///
/// 头部不存在的时候不会插入新的头部
pub fn substitute_header(text: &str, name: &str, value: &str) -> String {
    let mut res = String::with_capacity(text.len() + value.len());
    for (line, end) in lines(text) {
        match value_start(line, name) {
            Some(start) => {
                res.push_str(&line[..start]);
                res.push_str(value);
            }
            None => res.push_str(line),
        }
        res.push_str(end);
    }
    res
}

/// 查找第一个名为 name 的头部的值
pub fn search_header<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    lines(text)
        .into_iter()
        .find_map(|(line, _)| value_start(line, name).map(|start| &line[start..]))
}

/// 去掉末尾的一个 CRLF
pub fn trim_trailing_crlf(text: &str) -> &str {
    text.strip_suffix("\r\n").unwrap_or(text)
}

#[cfg(test)]
const REQUEST: &str = "GET /index.html HTTP/1.1\r\nHost: example.org\r\nAccept: */*\r\nAccept-Language: en\r\nUser-Agent: curl/7.0\r\n";

#[test]
fn strip_header_test() {
    let res = strip_header(REQUEST, "accept");
    assert_eq!(
        res,
        "GET /index.html HTTP/1.1\r\nHost: example.org\r\nAccept-Language: en\r\nUser-Agent: curl/7.0\r\n"
    );

    // 不存在的头部
    assert_eq!(strip_header(REQUEST, "Cache-Control"), REQUEST);
    assert_eq!(strip_header(REQUEST, "Accept-L"), REQUEST);

    // 多次出现全部删除，最后一行没有结束符
    let text = "Via: a\r\nHost: b\r\nvia: c";
    assert_eq!(strip_header(text, "Via"), "Host: b\r\n");
}

#[test]
fn substitute_header_test() {
    let res = substitute_header(REQUEST, "user-agent", "Mozilla/4.0");
    assert_eq!(res, REQUEST.replace("curl/7.0", "Mozilla/4.0"));

    assert_eq!(substitute_header(REQUEST, "Cookie", "a=b"), REQUEST);

    // 保持原来的结束符
    assert_eq!(
        substitute_header("Host: a\r\nUser-Agent:  x", "User-Agent", "y"),
        "Host: a\r\nUser-Agent:  y"
    );
    assert_eq!(
        substitute_header("User-Agent: x\nHost: a", "User-Agent", "y"),
        "User-Agent: y\nHost: a"
    );
}

#[test]
fn search_header_test() {
    assert_eq!(search_header(REQUEST, "HOST"), Some("example.org"));
    assert_eq!(search_header(REQUEST, "Accept"), Some("*/*"));
    assert_eq!(search_header(REQUEST, "Cookie"), None);
    assert_eq!(search_header("Set-Cookie: a=1\r\nSet-Cookie: b=2", "set-cookie"), Some("a=1"));
}

#[test]
fn trim_trailing_crlf_test() {
    assert_eq!(trim_trailing_crlf("Host: a\r\n\r\n"), "Host: a\r\n");
    assert_eq!(trim_trailing_crlf("Host: a"), "Host: a");
    assert_eq!(trim_trailing_crlf("Host: a\n"), "Host: a\n");
}
