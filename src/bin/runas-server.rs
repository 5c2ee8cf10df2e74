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

// Main entry point for the runas-rpc server
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use runas_rpc::config::ServerConfig;
use runas_rpc::identity::context::ImpersonationMode;
use runas_rpc::identity::login::LoginIdentity;
use runas_rpc::identity::proxy::{ProxyAuthorizer, ProxyUserPolicy};
use runas_rpc::rpc::{HandlerProcessor, ImpersonatingDispatcher, RpcServer};
use runas_rpc::service::{FsProvider, ListingService};
use runas_rpc::utils::telemetry::{init_tracing, install_panic_hook};

/// Serve directory listings, each executed as the authenticated caller.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Keytab holding the server principal's key and its clients' keys
    #[arg(short, long)]
    keytab: Option<PathBuf>,

    /// Server principal; `_HOST` expands to the local hostname
    #[arg(short, long)]
    principal: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Listen address
    #[arg(long)]
    bind: Option<String>,

    /// `proxied` or `advisory`
    #[arg(long)]
    mode: Option<ImpersonationMode>,

    /// Directory served as `/`
    #[arg(long)]
    root: Option<PathBuf>,

    /// Connections served concurrently
    #[arg(long)]
    max_workers: Option<usize>,

    /// Proxy policy YAML (proxied mode)
    #[arg(long)]
    proxy_policy: Option<PathBuf>,

    /// Seconds a connection may stay silent between calls
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(keytab) = self.keytab {
            config.keytab = Some(keytab);
        }
        if let Some(principal) = self.principal {
            config.principal = Some(principal);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(mode) = self.mode {
            config.impersonation_mode = Some(mode);
        }
        if let Some(root) = self.root {
            config.fs_root = root;
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout_secs = secs;
        }
        if let Some(policy) = self.proxy_policy {
            config.proxy_policy = Some(policy);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_panic_hook();

    let mut config = ServerConfig::from_env()?;
    cli.apply(&mut config);

    if let Err(e) = init_tracing(&config.log_level, &config.log_format) {
        eprintln!("Failed to init tracing: {}", e);
    }
    config.validate()?;
    let mode = config.mode()?;

    let login = Arc::new(LoginIdentity::login_from_keytab(
        config.principal()?,
        config.keytab()?,
    )?);

    let authorizer: Arc<dyn ProxyAuthorizer> = match &config.proxy_policy {
        Some(path) => Arc::new(ProxyUserPolicy::load(path)?),
        None => {
            if mode == ImpersonationMode::Proxied {
                warn!("No proxy policy configured, every delegation will be denied");
            }
            Arc::new(ProxyUserPolicy::deny_all())
        }
    };

    let service = ListingService::new(FsProvider::new(&config.fs_root));
    let dispatcher = ImpersonatingDispatcher::new(
        HandlerProcessor::new(service),
        Arc::clone(&login),
        mode,
        authorizer,
    );
    let server = RpcServer::bind(&config, login, dispatcher).await?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal.cancel();
        }
    });

    server.serve(shutdown).await?;
    info!("Server stopped");
    Ok(())
}
