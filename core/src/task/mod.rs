mod def;
mod matcher;
mod types;

pub use def::{HelpDef, JobDef, MatcherDef, NameValue, PluginDef, TaskCommonDef};
pub use matcher::{is_identifier, massage_regex, InputMatcher};
pub use types::{JobSpec, PluginSpec, Task, TaskBase, TaskConfig, TaskKind, TaskSpec, RUN_COMMAND};
