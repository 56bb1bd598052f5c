//! exchange.rs 被拦截的请求和响应
//!
//! 代理引擎负责连接和转发，这里只保存过滤器需要的数据：
//! 原始头部文本、实体内容以及两个控制标记

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str;
use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;

use crate::error::MessageError;
use crate::header::{strip_header, trim_trailing_crlf};

lazy_static! {
    static ref REQUEST_LINE: Regex = Regex::new(r"^([A-Z]+)\s+(.*)\s+(HTTP/\d\.\d)").unwrap();
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// 分配一个新的请求 id，同一进程内不会重复
pub fn next_id() -> u64 {
    COUNTER.fetch_add(1, Ordering::Relaxed) + 1
}

/// HTTP 方法
///
/// 对常见的几种进行封装，其余的保存原始字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    HEAD,
    CONNECT,
    OTHERS(String),
}

impl Method {
    /// 将HTTP请求的字符串转换成对应的枚举类型
    fn parse(method: &str) -> Method {
        match method {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "HEAD" => Method::HEAD,
            "CONNECT" => Method::CONNECT,
            _ => Method::OTHERS(method.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::HEAD => "HEAD",
            Self::CONNECT => "CONNECT",
            Self::OTHERS(method) => method.as_str(),
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP 版本号
///
/// 请求行正则保证格式为 HTTP/x.y，不认识的版本保存原始字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    Other(String),
}

impl HttpVersion {
    /// 将字符串转成对应的枚举类型
    pub fn parse(version: &str) -> HttpVersion {
        match version {
            "HTTP/1.0" => Self::Http10,
            "HTTP/1.1" => Self::Http11,
            _ => Self::Other(version.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
            Self::Other(version) => version.as_str(),
        }
    }
}

impl Display for HttpVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP 请求行
///
/// 包含三个部分： 请求方法、请求的 URL、HTTP 版本号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub url: String,
    pub version: HttpVersion,
}

impl RequestLine {
    /// 从头部的第一行解析请求行，比如 GET /hello HTTP/1.1
    pub fn parse(header: &str) -> Option<RequestLine> {
        let line = header.lines().next()?;
        let caps = REQUEST_LINE.captures(line)?;
        Some(RequestLine {
            method: Method::parse(&caps[1]),
            url: caps[2].to_string(),
            version: HttpVersion::parse(&caps[3]),
        })
    }

    /// 去掉查询参数之后的资源路径
    pub fn resource(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}

/// 被拦截的请求
///
/// id 由代理引擎分配，在同一次交互的四个阶段中保持不变
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub id: u64,
    pub header: String,
    pub body: Option<Vec<u8>>,
    /// 不再交给后续的处理者，直接转发；一旦设置不会被清除
    pub pass_through: bool,
    /// 跳过当前阶段中剩余的过滤单元
    pub skip_remaining: bool,
}

impl Request {
    pub fn new(id: u64, header: &str, body: Option<Vec<u8>>) -> Request {
        Request {
            id,
            header: header.to_string(),
            body,
            ..Request::default()
        }
    }

    pub fn request_line(&self) -> Option<RequestLine> {
        RequestLine::parse(&self.header)
    }

    /// 生成最终转发的字节，重新计算 Content-Length
    pub fn complete(&self) -> Vec<u8> {
        complete(&self.header, self.body.as_deref())
    }
}

/// 被拦截的响应
///
/// completable 为 false 的时候实体还没有完整接收，需要完整实体的改写不能进行
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub id: u64,
    pub completable: bool,
    pub header: String,
    pub body: Option<Vec<u8>>,
    pub pass_through: bool,
    pub skip_remaining: bool,
}

impl Response {
    pub fn new(id: u64, header: &str, body: Option<Vec<u8>>, completable: bool) -> Response {
        Response {
            id,
            completable,
            header: header.to_string(),
            body,
            ..Response::default()
        }
    }

    /// 生成最终返回给客户端的字节
    ///
    /// 只有 completable 的响应才会重新计算 Content-Length
    pub fn complete(&self) -> Vec<u8> {
        if self.completable {
            return complete(&self.header, self.body.as_deref());
        }
        let mut buf = trim_trailing_crlf(&self.header).as_bytes().to_vec();
        buf.extend_from_slice(b"\r\n\r\n");
        if let Some(body) = &self.body {
            buf.extend_from_slice(body);
        }
        buf
    }
}

fn complete(header: &str, body: Option<&[u8]>) -> Vec<u8> {
    let header = strip_header(header, "Content-Length");
    let mut buf = trim_trailing_crlf(&header).as_bytes().to_vec();
    match body {
        Some(body) => {
            buf.extend_from_slice(format!("\r\nContent-Length: {}\r\n\r\n", body.len()).as_bytes());
            buf.extend_from_slice(body);
        }
        None => buf.extend_from_slice(b"\r\n\r\n"),
    }
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,    // 最开始的状态
    More,    // 处于一行中的内容
    NewLine, // 接收到一个\n
    Return1, // 只接收到一个\r
    Return2, // 连续接收到两个\r，或者\r\n\r
    End,     // 最后接收到两个\r\n\r\n或者\n\n的时候结束
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharType {
    Return,  // \r
    NewLine, // \n
    Others,  // 其他字符
}

// init --others--> more --\r--> return1 --\n--> newline --\r--> return2 --\n--> end
//                   \-------------\n------------^     \----------\n----------^
// init 遇到 \r 或 \n、return1/return2 后面不是 \n 都是 invalid
fn transform(current: State, input: CharType) -> State {
    match current {
        State::Init => match input {
            CharType::Return | CharType::NewLine => State::Invalid,
            _ => State::More,
        },
        State::More => match input {
            CharType::Return => State::Return1,
            CharType::NewLine => State::NewLine,
            _ => State::More,
        },
        State::Return1 => match input {
            CharType::NewLine => State::NewLine,
            _ => State::Invalid,
        },
        State::NewLine => match input {
            CharType::Return => State::Return2,
            CharType::NewLine => State::End,
            _ => State::More,
        },
        State::Return2 => match input {
            CharType::NewLine => State::End,
            _ => State::Invalid,
        },
        _ => State::More,
    }
}

fn to_char_type(byte: u8) -> CharType {
    match byte {
        10 => CharType::NewLine,
        13 => CharType::Return,
        _ => CharType::Others,
    }
}

/// 将原始报文切分成头部和实体
///
/// 头部不包含结尾的空行，空行之后没有内容时实体为 None
pub fn split_message(raw: &[u8]) -> Result<(String, Option<Vec<u8>>), MessageError> {
    let mut state = State::Init;
    // 最近一个行结束符开始的位置
    let mut line_end = 0;
    let mut header_end = None;

    for (i, byte) in raw.iter().enumerate() {
        let next = transform(state, to_char_type(*byte));
        match next {
            State::Invalid => return Err(MessageError::Invalid(i)),
            State::End => {
                header_end = Some(i + 1);
                break;
            }
            State::Return1 => line_end = i,
            State::NewLine if state == State::More => line_end = i,
            _ => {}
        }
        state = next;
    }

    let (header, body) = match header_end {
        Some(end) => (&raw[..line_end], &raw[end..]),
        None => (raw, &raw[raw.len()..]),
    };
    let header = str::from_utf8(header).map_err(|_| MessageError::NotUtf8)?;
    let body = if body.is_empty() {
        None
    } else {
        Some(body.to_vec())
    };
    Ok((header.to_string(), body))
}

#[test]
fn to_char_type_test() {
    assert_eq!(to_char_type('\n' as u8), CharType::NewLine);
    assert_eq!(to_char_type('\r' as u8), CharType::Return);
    assert_eq!(to_char_type('a' as u8), CharType::Others);
}

#[test]
fn request_line_test() {
    let line = RequestLine::parse("POST /login.aspx?x=1 HTTP/1.1\r\nHost: a").unwrap();
    assert_eq!(line.method, Method::POST);
    assert_eq!(line.url, "/login.aspx?x=1");
    assert_eq!(line.version, HttpVersion::Http11);
    assert_eq!(line.resource(), "/login.aspx");

    let line = RequestLine::parse("PUT http://a/b c HTTP/1.0").unwrap();
    assert_eq!(line.method, Method::OTHERS("PUT".to_string()));
    assert_eq!(line.url, "http://a/b c");

    let line = RequestLine::parse("GET /a.gif HTTP/0.9").unwrap();
    assert_eq!(line.version, HttpVersion::Other("HTTP/0.9".to_string()));
    assert_eq!(line.version.to_string(), "HTTP/0.9");
    assert_eq!(line.resource(), "/a.gif");

    assert!(RequestLine::parse("HTTP/1.1 200 OK\r\n").is_none());
    assert!(RequestLine::parse("get / HTTP/1.1").is_none());
    assert!(RequestLine::parse("").is_none());
}

#[test]
fn split_message_test() {
    let (header, body) =
        split_message(b"POST /login HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").unwrap();
    assert_eq!(header, "POST /login HTTP/1.1\r\nContent-Length: 5");
    assert_eq!(body, Some(b"hello".to_vec()));

    let (header, body) = split_message(b"GET / HTTP/1.1\nHost: a\n\n").unwrap();
    assert_eq!(header, "GET / HTTP/1.1\nHost: a");
    assert_eq!(body, None);

    let (header, body) = split_message(b"GET / HTTP/1.1\r\nHost: a").unwrap();
    assert_eq!(header, "GET / HTTP/1.1\r\nHost: a");
    assert_eq!(body, None);

    // 行结束符混用时头部在最后一个内容字符处截断
    let (header, body) = split_message(b"GET / HTTP/1.1\nHost: a\r\n\r\nbody").unwrap();
    assert_eq!(header, "GET / HTTP/1.1\nHost: a");
    assert_eq!(body, Some(b"body".to_vec()));

    assert!(matches!(
        split_message(b"\r\nGET / HTTP/1.1"),
        Err(MessageError::Invalid(0))
    ));
}

#[test]
fn complete_test() {
    let request = Request::new(
        1,
        "POST / HTTP/1.1\r\nContent-Length: 99\r\nHost: a\r\n",
        Some(b"a=1".to_vec()),
    );
    assert_eq!(
        request.complete(),
        b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 3\r\n\r\na=1".to_vec()
    );

    let request = Request::new(2, "GET / HTTP/1.1\r\nHost: a", None);
    assert_eq!(request.complete(), b"GET / HTTP/1.1\r\nHost: a\r\n\r\n".to_vec());

    let response = Response::new(2, "HTTP/1.1 200 OK", Some(b"par".to_vec()), false);
    assert_eq!(response.complete(), b"HTTP/1.1 200 OK\r\n\r\npar".to_vec());
}

#[test]
fn next_id_test() {
    let a = next_id();
    let b = next_id();
    assert!(b > a);
}
