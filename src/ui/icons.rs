pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const INFO: &str = "ℹ️";
    pub const LINK: &str = "🔗";
    pub const EYE: &str = "👀";
    pub const FILE: &str = "📄";
    pub const COMMAND: &str = "⚡";
    pub const NEW: &str = "✨";
    pub const MOD: &str = "📝";
    pub const DEL: &str = "🗑️";
    pub const MOVE: &str = "➡️";
    pub const GLOBE: &str = "🌐";
}
