use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mapshot::http::ReqwestClient;
use mapshot::{EngineConfig, Error, Projection, RenderRequest, Viewport};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mapshot", version, about = "Render WMS map definitions to PNG")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one map definition
    Render(RenderArgs),
    /// Serve the forward proxy
    #[cfg(feature = "proxy")]
    Proxy(ProxyArgs),
}

#[derive(Args)]
struct RenderArgs {
    /// Raw invocation query string; overrides the individual parameters
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    map_def_url: Option<String>,
    #[arg(long)]
    gs_url: Option<String>,
    #[arg(long)]
    gs_public_url: Option<String>,
    #[arg(long)]
    proxy_header: Option<String>,
    #[arg(long)]
    editor: Option<String>,
    #[arg(long)]
    file_name: Option<String>,
    #[arg(long, default_value_t = 500)]
    width: u32,
    #[arg(long, default_value_t = 500)]
    height: u32,
    #[arg(long, default_value_t = 1.0)]
    pixel_ratio: f64,
    #[arg(long, env = "MAPSHOT_PROXY_BASE", default_value = "http://localhost:8080")]
    proxy_base: String,
    #[arg(long, default_value = "EPSG:3857")]
    projection: String,
    /// Delay between triggering image loads and painting. Only images that
    /// arrived by then are drawn; 0 paints right away and over a real network
    /// yields a blank image.
    #[arg(long, default_value_t = 3000)]
    settle_ms: u64,
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,
    /// Directory receiving the image when --file-name is set
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    /// Print the PNG data URL
    #[arg(long, default_value_t = false)]
    data_url: bool,
    /// Print the whole run report (logs included) as JSON
    #[arg(long, default_value_t = false)]
    logs_json: bool,
}

#[cfg(feature = "proxy")]
#[derive(Args)]
struct ProxyArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value = "dist")]
    static_root: PathBuf,
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,
    /// Largest request body relayed upstream
    #[arg(long, default_value_t = mapshot::proxy::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    /// Verify upstream certificates on the HTTPS route
    #[arg(long, default_value_t = false)]
    strict_tls: bool,
}

impl RenderArgs {
    fn request(&self) -> mapshot::Result<RenderRequest> {
        if let Some(query) = &self.query {
            return RenderRequest::from_query(query);
        }
        let map_def_url = self
            .map_def_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::MissingParameter("map_def_url".to_string()))?;
        Ok(RenderRequest {
            map_def_url,
            gs_url: self.gs_url.clone(),
            gs_public_url: self.gs_public_url.clone(),
            proxy_header: self.proxy_header.clone(),
            editor: self.editor.clone(),
            file_name: self.file_name.clone(),
        })
    }

    fn config(&self) -> mapshot::Result<EngineConfig> {
        Ok(EngineConfig {
            viewport: Viewport {
                width: self.width,
                height: self.height,
            },
            pixel_ratio: self.pixel_ratio,
            proxy_base: self.proxy_base.clone(),
            timeout_ms: self.timeout_ms,
            settle_ms: self.settle_ms,
            view_projection: self.projection.parse::<Projection>()?,
            ..Default::default()
        })
    }
}

fn render(args: RenderArgs) -> anyhow::Result<bool> {
    let config = args.config()?;
    let client = Arc::new(ReqwestClient::new(&config)?);

    // one cooperative event loop, like the page the maps were designed for
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let report = runtime.block_on(mapshot::run(args.request(), &config, client, &args.out_dir));

    if args.logs_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if args.data_url {
        if let Some(url) = &report.data_url {
            println!("{}", url);
        }
    }
    if let Some(path) = &report.saved_file {
        log::info!("image written to {}", path.display());
    }
    if let Some(error) = &report.error {
        eprintln!("render failed: {}", error);
    }
    Ok(report.is_success())
}

#[cfg(feature = "proxy")]
fn proxy(args: ProxyArgs) -> anyhow::Result<bool> {
    use mapshot::proxy::{LegacyTls, ProxyConfig};

    let config = ProxyConfig {
        host: args.host,
        port: args.port,
        static_root: args.static_root,
        timeout_ms: args.timeout_ms,
        max_body_bytes: args.max_body_bytes,
        legacy_tls: if args.strict_tls { LegacyTls::strict() } else { LegacyTls::default() },
    };
    if config.legacy_tls.accept_invalid_certs {
        log::warn!("https_proxy accepts invalid upstream certificates");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("cannot bind {}", config.bind_addr()))?;
        mapshot::proxy::serve(listener, &config).await?;
        Ok::<_, anyhow::Error>(())
    })?;
    Ok(true)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ok = match Cli::parse().command {
        Command::Render(args) => render(args)?,
        #[cfg(feature = "proxy")]
        Command::Proxy(args) => proxy(args)?,
    };
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
