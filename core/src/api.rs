//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `opsbot_core::api` instead of reaching into internal modules.

pub use crate::config::{
    get_opsbot_data_dir, load_default, load_from_path, BotInfo, EngineConfig, LoggingConfig,
    PathsConfig, ReplyConfig, ScheduledTaskDef, UserInfo,
};
pub use crate::connector::{Connector, MessageFormat};
pub use crate::context::{Engine, Services, ServicesFactory};
pub use crate::dispatch::{Dispatch, Handled, IncomingMessage, CATCHALL_COMMAND};
pub use crate::error::{CliError, EngineError, ExecError, RetVal, TaskOutcome};
pub use crate::exec::{
    ProcessExit, ProcessRunner, ProcessSession, ProcessStartArgs, Signal, ABORTED_MESSAGE,
};
pub use crate::handler::{HandlerRegistry, NativeHandler};
pub use crate::history::{HistoryLog, HistoryLogger, HistoryProvider, TaskHistory, HISTORY_TIME_FORMAT};
pub use crate::pipeline::{PipelineOutcome, PipelineRequest, ADMIN_ONLY_MESSAGE};
pub use crate::registry::{TaskRegistry, TaskTable};
pub use crate::reply::{resolve_reply_pattern, ReplyMatcher, ReplyTable};
pub use crate::robot::Robot;
pub use crate::run::{RunContext, RunEvent, RunId, RunParams, RunRegistry, TriggerKind};
pub use crate::scheduler::{ScheduleReport, ScheduleZone};
pub use crate::store::{store_parameter, Checkout, Store, HISTORY_PREFIX, PARAM_PREFIX};
pub use crate::task::{
    HelpDef, JobDef, MatcherDef, NameValue, PluginDef, Task, TaskCommonDef, TaskSpec, RUN_COMMAND,
};
