mod load;
mod types;

pub use load::{get_opsbot_data_dir, load_default, load_from_path};
pub use types::{
    BotInfo, EngineConfig, LoggingConfig, PathsConfig, ReplyConfig, ScheduledTaskDef,
    UserInfo,
};
