//! 即时通讯系统核心领域模型
//!
//! 包含用户、消息、会话等核心实体，以及邮箱验证状态机的业务规则。

pub mod errors;
pub mod message;
pub mod session;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use session::*;
pub use user::*;
pub use value_objects::*;
