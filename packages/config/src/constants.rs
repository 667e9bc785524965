// ABOUTME: Environment variable names and workspace-wide default values
// ABOUTME: Single source of truth for path policy, ceilings, intervals, and thresholds

// Environment variable names
pub const RELAY_PORT: &str = "RELAY_PORT";
pub const RELAY_SANDBOX_URL: &str = "RELAY_SANDBOX_URL";
pub const RELAY_SANDBOX_API_KEY: &str = "RELAY_SANDBOX_API_KEY";
pub const RELAY_TUNNEL_URL: &str = "RELAY_TUNNEL_URL";
pub const RELAY_TUNNEL_ENABLED: &str = "RELAY_TUNNEL_ENABLED";
pub const RELAY_TUNNEL_AUTOSTART: &str = "RELAY_TUNNEL_AUTOSTART";
pub const RELAY_TUNNEL_COMMAND: &str = "RELAY_TUNNEL_COMMAND";
pub const RELAY_IDLE_TIMEOUT_SECS: &str = "RELAY_IDLE_TIMEOUT_SECS";
pub const RELAY_MAX_DURATION_SECS: &str = "RELAY_MAX_DURATION_SECS";

// Tool server defaults
pub const DEFAULT_PORT: u16 = 4090;

// Sandbox service defaults
pub const DEFAULT_SANDBOX_URL: &str = "http://localhost:8080";

// Sandbox filesystem policy. Sanitized paths must land under one of the
// allowed prefixes; blocked patterns are stripped to a fixed point.
pub const ALLOWED_SANDBOX_PREFIXES: &[&str] =
    &["/home/user", "/tmp", "/workspace"];
pub const BLOCKED_PATH_PATTERNS: &[&str] = &[
    "..", "~", "/etc/", "/root/", "/var/", "/usr/", "/bin/", "/sbin/", "/proc/", "/sys/",
];
pub const SANDBOX_WORK_DIR: &str = "/home/user";
pub const SANDBOX_OUTPUT_DIR: &str = "/home/user/output";

// Transfer and input ceilings
pub const MAX_TRANSFER_BYTES: u64 = 25 * 1024 * 1024;
pub const MAX_TASK_INPUT_CHARS: usize = 50_000;

// Session lifetime ceilings
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_DURATION_SECS: u64 = 3600;
pub const IDLE_SWEEP_INTERVAL_SECS: u64 = 60;

// Tunnel health monitoring
pub const TUNNEL_PROBE_INTERVAL_SECS: u64 = 30;
pub const TUNNEL_FAILURE_THRESHOLD: u32 = 3;
pub const TUNNEL_OPEN_DEADLINE_SECS: u64 = 30;
pub const DEFAULT_TUNNEL_COMMAND: &str = "cloudflared";

// Env var names containing any of these substrings are never forwarded
// into the sandbox execution environment.
pub const SENSITIVE_ENV_SUBSTRINGS: &[&str] =
    &["KEY", "SECRET", "TOKEN", "PASSWORD", "CREDENTIAL"];

// Extensions transferred as base64 rather than UTF-8 text.
pub const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "pdf", "zip", "tar", "gz", "bz2", "xz", "7z",
    "xlsx", "xls", "docx", "doc", "pptx", "parquet", "sqlite", "db", "bin", "so", "dylib", "wasm",
];

// Extensions tried, in order, when fuzzy-resolving a local path that
// does not exist as given.
pub const FUZZY_MATCH_EXTENSIONS: &[&str] = &[
    "csv", "txt", "md", "json", "py", "xlsx", "pdf", "png", "jpg", "html", "yaml", "yml",
];
