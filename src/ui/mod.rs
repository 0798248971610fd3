pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, info, status, success, trigger};
pub use progress::{build_summary, Spinner};
pub use table::{graph_table, TableBuilder};
pub use theme::{theme, Theme};
