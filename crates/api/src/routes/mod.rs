//! # 路由控制器
//!
//! 每个子模块对应一组 REST 接口，Handler 通过 `#[utoipa::path]` 注册到 OpenAPI 文档。

pub mod agent;
pub mod health;
pub mod holdings;
pub mod scheduler;
