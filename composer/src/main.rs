/*
Copyright 2024 The Kubernetes Authors.

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

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use composer::{apply, compose, exports, StackConfig};
use kube::Client;
use tracing::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(version, about = "Composes and applies the monitoring stack manifests")]
struct Options {
    #[clap(flatten)]
    stack: StackArgs,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct StackArgs {
    /// YAML configuration record; the built-in stack is used when omitted.
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(long, global = true)]
    namespace: Option<String>,
    #[clap(long, global = true)]
    domain: Option<String>,
    /// PEM certificate stored in the TLS secret.
    #[clap(long, global = true, requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key stored in the TLS secret.
    #[clap(long, global = true, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the manifests as a multi-document YAML stream.
    Render {
        /// Write the stream to a file instead of stdout.
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
    /// Server-side apply the stack to the current kube context.
    Apply,
    /// Delete the stack's namespace.
    Destroy,
    /// Print the URLs the stack is reachable at once applied. Needs no TLS material.
    Urls,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Options::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run(opts).await {
        error!("{error:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(opts: Options) -> anyhow::Result<()> {
    let config = load_config(opts.stack)?;

    match opts.command {
        Command::Render { output } => {
            let manifests = compose(&config)?.to_yaml()?;
            match output {
                Some(path) => {
                    fs::write(&path, manifests)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!("wrote manifests to {}", path.display());
                }
                None => print!("{manifests}"),
            }
        }
        Command::Apply => {
            let graph = compose(&config)?;
            let client = Client::try_default()
                .await
                .context("failed to create kube Client")?;
            apply::apply(client, &graph).await?;
            for (service, url) in graph.exports() {
                info!("{service}: {url}");
            }
        }
        Command::Destroy => {
            config.validate_namespace()?;
            let client = Client::try_default()
                .await
                .context("failed to create kube Client")?;
            apply::destroy(client, &config.namespace).await?;
        }
        Command::Urls => {
            for (service, url) in exports(&config)? {
                println!("{service}\t{url}");
            }
        }
    }
    Ok(())
}

fn load_config(args: StackArgs) -> anyhow::Result<StackConfig> {
    let mut config = match &args.config {
        Some(path) => StackConfig::from_file(path)?,
        None => StackConfig::default(),
    };
    if let Some(namespace) = args.namespace {
        config.namespace = namespace;
    }
    if let Some(domain) = args.domain {
        config.domain = domain;
    }
    if let (Some(cert), Some(key)) = (args.tls_cert, args.tls_key) {
        config = config.with_tls_files(cert, key)?;
    }
    debug!(namespace = %config.namespace, domain = %config.domain, "loaded configuration");
    Ok(config)
}
