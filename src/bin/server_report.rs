/*
Copyright 2025 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use clap::Parser;
use log::{error, info};
use server_report::{
    renderer_for, CollectionService, FileConfig, HttpDataPublisher, LocalTarget, PublishConfig,
    RemoteTarget, ReportFormat, ReportingService, Target,
};
use server_report::{DataPublisher, TargetReport};
use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "server_report", version, about = "Server inventory and performance characterization reports")]
struct Cli {
    /// Remote target as [user@]host[:port]; may be repeated. Collects from
    /// the local host when no targets are given.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// SSH identity file for remote targets
    #[arg(long)]
    key: Option<String>,

    /// Directory reports are written under
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Output format (txt, json, html, xlsx); may be repeated. Defaults to
    /// all formats.
    #[arg(long = "format")]
    formats: Vec<ReportFormatArg>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-script timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Never attempt privilege escalation with sudo
    #[arg(long)]
    no_sudo: bool,

    /// Post reports to the publish endpoint after collection
    #[arg(long)]
    post: bool,

    /// Publish endpoint URL, overrides the config file
    #[arg(long)]
    endpoint: Option<String>,

    /// Bearer token for the publish endpoint
    #[arg(long, env = "SERVER_REPORT_TOKEN")]
    auth_token: Option<String>,

    /// Label attached to published payloads, in key=value form; may be
    /// repeated
    #[arg(long = "label", value_parser = parse_label)]
    labels: Vec<(String, String)>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone)]
struct ReportFormatArg(ReportFormat);

impl std::str::FromStr for ReportFormatArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ReportFormatArg)
    }
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err("label must be in key=value format".to_string()),
    }
}

/// Parses `[user@]host[:port]` into an ssh destination and port
fn parse_target_spec(spec: &str) -> (String, String, Option<u16>) {
    let (destination, port) = match spec.rsplit_once(':') {
        Some((head, tail)) => match tail.parse::<u16>() {
            Ok(port) => (head.to_string(), Some(port)),
            Err(_) => (spec.to_string(), None),
        },
        None => (spec.to_string(), None),
    };
    let name = destination
        .split_once('@')
        .map(|(_, host)| host.to_string())
        .unwrap_or_else(|| destination.clone());
    (name, destination, port)
}

fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    "localhost".to_string()
}

fn build_publish_config(cli: &Cli, file_config: &FileConfig) -> Option<PublishConfig> {
    let mut config: Option<PublishConfig> =
        file_config.publish.clone().map(PublishConfig::from);
    if let Some(ref endpoint) = cli.endpoint {
        let base = config.take().unwrap_or(PublishConfig {
            endpoint: String::new(),
            auth_token: None,
            labels: HashMap::new(),
        });
        config = Some(PublishConfig {
            endpoint: endpoint.clone(),
            ..base
        });
    }
    let mut config = config?;
    if let Some(ref token) = cli.auth_token {
        config.auth_token = Some(token.clone());
    }
    for (key, value) in &cli.labels {
        config.labels.insert(key.clone(), value.clone());
    }
    Some(config)
}

fn write_reports(
    reports: &[TargetReport],
    formats: &[ReportFormat],
    output_root: &std::path::Path,
) -> Result<(), Box<dyn Error>> {
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
    let dir = output_root.join(format!("{}_{stamp}", local_hostname()));
    std::fs::create_dir_all(&dir)?;
    for report in reports {
        for format in formats {
            let bytes = renderer_for(*format).render(report)?;
            let path = dir.join(format!("{}.{}", report.target, format.extension()));
            std::fs::write(&path, bytes)?;
            info!("wrote {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" },
    ))
    .init();

    let file_config = match cli.config {
        Some(ref path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let timeout_secs = cli
        .timeout
        .or(file_config.command_timeout_secs)
        .unwrap_or(60);
    let mut formats: Vec<ReportFormat> = cli.formats.iter().map(|f| f.0).collect();
    if formats.is_empty() {
        if let Some(ref configured) = file_config.formats {
            for name in configured {
                formats.push(name.parse()?);
            }
        }
    }
    if formats.is_empty() {
        formats = ReportFormat::all();
    }

    let targets: Vec<Arc<dyn Target>> = if cli.targets.is_empty() {
        vec![Arc::new(LocalTarget::new(
            &local_hostname(),
            !cli.no_sudo,
        ))]
    } else {
        cli.targets
            .iter()
            .map(|spec| {
                let (name, destination, port) = parse_target_spec(spec);
                Arc::new(RemoteTarget::new(
                    &name,
                    &destination,
                    port,
                    cli.key.clone(),
                )) as Arc<dyn Target>
            })
            .collect()
    };

    let service = CollectionService::new(Duration::from_secs(timeout_secs));
    let reports = service.collect_all(targets).await;
    if reports.is_empty() {
        error!("no reports were collected");
        std::process::exit(1);
    }

    let output_root = file_config
        .output_dir
        .as_ref()
        .filter(|_| cli.output == PathBuf::from("."))
        .map(PathBuf::from)
        .unwrap_or_else(|| cli.output.clone());
    write_reports(&reports, &formats, &output_root)?;

    if cli.post {
        let publish_config = build_publish_config(&cli, &file_config).ok_or(
            "publishing requested but no endpoint configured; use --endpoint or the config file",
        )?;
        let publisher = HttpDataPublisher::with_defaults()?;
        for report in &reports {
            publisher.publish(report, &publish_config).await?;
            info!("published report for {}", report.target);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_spec() {
        assert_eq!(
            parse_target_spec("admin@db1.example.com:2222"),
            (
                "db1.example.com".to_string(),
                "admin@db1.example.com".to_string(),
                Some(2222)
            )
        );
        assert_eq!(
            parse_target_spec("db1"),
            ("db1".to_string(), "db1".to_string(), None)
        );
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("rack=r12"),
            Ok(("rack".to_string(), "r12".to_string()))
        );
        assert!(parse_label("rack").is_err());
        assert!(parse_label("=value").is_err());
    }
}
