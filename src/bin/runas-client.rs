// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Command-line client: list a directory on a runas-rpc server
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use runas_rpc::config::ClientConfig;
use runas_rpc::engine_core::constants::defaults;
use runas_rpc::engine_core::errors::ClientError;
use runas_rpc::identity::login::LoginIdentity;
use runas_rpc::rpc::RpcClient;
use runas_rpc::transport::{IdentityTransport, SaslClientTransport};
use runas_rpc::utils::telemetry::{init_tracing, install_panic_hook};

/// List a directory on a runas-rpc server as yourself.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Primary of the server principal
    #[arg(long)]
    service_primary: Option<String>,

    /// Instance of the server principal (defaults to the host)
    #[arg(long)]
    service_instance: Option<String>,

    /// Client principal (defaults to the keytab's only entry)
    #[arg(short, long)]
    principal: Option<String>,

    /// Client keytab
    #[arg(short, long)]
    keytab: Option<PathBuf>,

    /// Directory to list
    #[arg(default_value = defaults::LIST_PATH)]
    dir: String,
}

impl Cli {
    fn apply(&self, config: &mut ClientConfig) {
        if let Some(host) = &self.host {
            config.server_host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(primary) = &self.service_primary {
            config.service_primary = Some(primary.clone());
        }
        if let Some(instance) = &self.service_instance {
            config.service_instance = Some(instance.clone());
        }
        if let Some(principal) = &self.principal {
            config.principal = Some(principal.clone());
        }
        if let Some(keytab) = &self.keytab {
            config.keytab = Some(keytab.clone());
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env()?;
    cli.apply(&mut config);
    if let Err(e) = init_tracing(&config.log_level, &config.log_format) {
        eprintln!("Failed to init tracing: {}", e);
    }

    let login = Arc::new(LoginIdentity::login_default(
        config.principal.as_deref(),
        config.keytab()?,
    )?);
    let inner = SaslClientTransport::new(
        config.server_addr()?,
        config.service_primary()?,
        config.service_instance()?,
    );
    let mut client = RpcClient::new(IdentityTransport::new(inner, login));

    client.open().await?;
    println!("$ ls {}", cli.dir);
    let listing = client.list(&cli.dir).await;
    let closed = client.close().await;
    print!("{}", settle(listing, closed)?);
    Ok(())
}

/// The listing's own error wins over a failure to close afterwards.
fn settle(
    listing: Result<String, ClientError>,
    closed: Result<(), ClientError>,
) -> Result<String, ClientError> {
    if let Err(e) = closed {
        warn!("Failed to close connection: {}", e);
    }
    listing
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    install_panic_hook();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
