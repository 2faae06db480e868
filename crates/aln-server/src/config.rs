//! CLI/env configuration surface (spec.md §6). Pinned here as the single
//! place that reads `ADMIN_PASSWORD`, `VLC_HOST`, `VLC_PORT`, the
//! video-playback feature flag, the HTTP port and the CORS allowlist,
//! grounded on the `clap::Parser` + env-fallback pattern in
//! `sx9-gateway-primary/src/main.rs` (one of the other example repos, not
//! the teacher — the teacher has no CLI surface to generalize from).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "aln-orchestrator")]
#[command(about = "Live-action game orchestrator: session, scoring, transaction and video-playback core")]
#[command(version)]
pub struct Config {
    /// Password required for `/api/admin/auth`.
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: String,

    /// VLC HTTP control interface host.
    #[arg(long, env = "VLC_HOST", default_value = "127.0.0.1")]
    pub vlc_host: String,

    /// VLC HTTP control interface port.
    #[arg(long, env = "VLC_PORT", default_value_t = 8080)]
    pub vlc_port: u16,

    /// VLC HTTP control interface password.
    #[arg(long, env = "VLC_PASSWORD", default_value = "")]
    pub vlc_password: String,

    /// Filename the idle loop returns to between videos.
    #[arg(long, env = "IDLE_LOOP_FILE", default_value = "idle-loop.mp4")]
    pub idle_loop_file: String,

    /// Disables all video-playback side effects; tokens with a video asset
    /// are accepted but never enqueued (spec.md §6 feature flag).
    #[arg(long, env = "VIDEO_PLAYBACK_ENABLED", default_value_t = true)]
    pub video_playback_enabled: bool,

    /// HTTP port the orchestrator listens on.
    #[arg(long, env = "HTTP_PORT", default_value_t = 3000)]
    pub http_port: u16,

    /// Comma-separated list of allowed CORS origins. Empty disables CORS.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "")]
    pub cors_origins: Vec<String>,

    /// Directory persisted state (session, scores, offline queue, token
    /// catalog fallback) is written under.
    #[arg(long, env = "STATE_DIR", default_value = "./state")]
    pub state_dir: String,

    /// Path to the token catalog JSON document loaded at startup.
    #[arg(long, env = "TOKEN_CATALOG_PATH", default_value = "./tokens.json")]
    pub token_catalog_path: String,

    /// Bearer token lifetime for `/api/admin/auth`, in seconds.
    #[arg(long, env = "ADMIN_TOKEN_TTL_SECS", default_value_t = 3600)]
    pub admin_token_ttl_secs: u64,
}
