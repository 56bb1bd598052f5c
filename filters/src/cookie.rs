//! Set-Cookie 记录
//!
//! 每条记录占一行，格式为 `"<host>" "<url>" Set-Cookie: "<cookie>"`

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// 一次捕获到的 Set-Cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieEvent {
    pub host: String,
    pub url: String,
    pub cookie: String,
}

impl CookieEvent {
    pub fn to_line(&self) -> String {
        format!(
            "\"{}\" \"{}\" Set-Cookie: \"{}\"\n",
            self.host, self.url, self.cookie
        )
    }
}

/// 记录的写入端
///
/// 会被多个交互同时调用，实现需要保证每条记录完整写入，不会和其他记录交错
pub trait CookieSink: Send + Sync {
    fn append(&self, event: &CookieEvent) -> io::Result<()>;
}

/// 追加写入的文件
pub struct CookieLog {
    file: Mutex<File>,
}

impl CookieLog {
    /// 以追加的方式打开文件，不存在时创建
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<CookieLog> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(CookieLog {
            file: Mutex::new(file),
        })
    }
}

impl CookieSink for CookieLog {
    fn append(&self, event: &CookieEvent) -> io::Result<()> {
        let line = event.to_line();
        // 持有锁直到整行写完
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

#[test]
fn to_line_test() {
    let event = CookieEvent {
        host: "example.org".to_string(),
        url: "/login".to_string(),
        cookie: "sid=1; path=/".to_string(),
    };
    assert_eq!(
        event.to_line(),
        "\"example.org\" \"/login\" Set-Cookie: \"sid=1; path=/\"\n"
    );
}

#[test]
fn concurrent_append_test() {
    use std::fs;
    use std::sync::Arc;
    use std::thread;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Cookies.txt");
    let log = Arc::new(CookieLog::open(&path).unwrap());

    let mut handles = Vec::new();
    for t in 0..8 {
        let log = Arc::clone(&log);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let event = CookieEvent {
                    host: format!("host{}", t),
                    url: format!("/page/{}", i),
                    cookie: "x".repeat(512),
                };
                log.append(&event).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 400);
    let expected_cookie = format!("Set-Cookie: \"{}\"", "x".repeat(512));
    for line in lines {
        assert!(line.starts_with("\"host"));
        assert!(line.ends_with(&expected_cookie));
    }
}

#[test]
fn reopen_appends_test() {
    use std::fs;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Cookies.txt");
    let event = CookieEvent {
        host: "a".to_string(),
        url: "/".to_string(),
        cookie: "c=1".to_string(),
    };

    CookieLog::open(&path).unwrap().append(&event).unwrap();
    CookieLog::open(&path).unwrap().append(&event).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), event.to_line().repeat(2));
}
