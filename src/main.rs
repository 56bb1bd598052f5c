use std::fs;
use std::process;

use clap::{App, Arg, ArgMatches, SubCommand};
use log::info;

use filters::config::FILENAME;
use filters::exchange::{next_id, split_message};
use filters::{Config, FilterChain, Request, Response};

/// 读取一条完整的 HTTP 报文，拆分成头部和实体
fn read_message(path: &str) -> Result<(String, Option<Vec<u8>>), String> {
    let raw = fs::read(path).map_err(|e| format!("cannot read `{}`: {}", path, e))?;
    split_message(&raw).map_err(|e| format!("cannot parse `{}`: {}", path, e))
}

fn show(stage: &str, message: &[u8]) {
    println!("===== {} =====", stage);
    println!("{}", String::from_utf8_lossy(message));
}

/// 让请求和响应依次经过过滤链的四个阶段，输出每个阶段之后的报文
fn replay(config: &Config, matches: &ArgMatches) -> Result<(), String> {
    let chain = FilterChain::from_config(config).map_err(|e| e.to_string())?;
    info!("filter chain: {:?}", chain.names());

    let path = matches.value_of("request").unwrap_or_default();
    let (header, body) = read_message(path)?;
    let request = Request::new(next_id(), &header, body);

    let request = chain.run_pre_request(request);
    show("pre_request", &request.complete());
    let request = chain.run_post_request(request);
    show("post_request", &request.complete());

    if let Some(path) = matches.value_of("response") {
        let (header, body) = read_message(path)?;
        let response = Response::new(request.id, &header, body, true);

        let response = chain.run_pre_response(&request, response);
        show("pre_response", &response.complete());
        let response = chain.run_post_response(&request, response);
        show("post_response", &response.complete());
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = App::new("proxy-filters")
        .version("1.0.0")
        .about("Replay HTTP messages through the proxy filter chain")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .default_value(FILENAME)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("replay")
                .about("Run a captured request (and response) through the chain")
                .arg(
                    Arg::with_name("request")
                        .value_name("REQUEST")
                        .help("Raw HTTP request file")
                        .required(true),
                )
                .arg(
                    Arg::with_name("response")
                        .short("r")
                        .long("response")
                        .value_name("FILE")
                        .help("Raw HTTP response file"),
                ),
        )
        .subcommand(SubCommand::with_name("init").about("Write the default configuration file"))
        .subcommand(SubCommand::with_name("show-config").about("Print the effective configuration"))
        .get_matches();

    let path = matches.value_of("config").unwrap_or(FILENAME);

    if matches.subcommand_matches("init").is_some() {
        Config::generate_default(path).map_err(|e| e.to_string())?;
        println!("default configuration written to {}", path);
        return Ok(());
    }

    let config = Config::parse(path).map_err(|e| e.to_string())?;
    filters::log::init(&config.log).map_err(|e| e.to_string())?;

    match matches.subcommand() {
        ("show-config", _) => {
            let json = config.to_json().map_err(|e| e.to_string())?;
            println!("{}", json);
            Ok(())
        }
        ("replay", Some(sub)) => replay(&config, sub),
        _ => Err(matches.usage().to_string()),
    }
}

fn main() {
    if let Err(e) = run() {
        // 配置读取失败时日志还没有初始化，直接输出到终端
        eprintln!("{}", e);
        process::exit(1);
    }
}
