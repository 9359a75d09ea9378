//! # `stockcheck-api` - HTTP API 层
//!
//! 组合分析服务的 HTTP/REST 入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收前端看板或脚本的 HTTP 请求
//! - 把分析请求委托给 `AnalysisEngine`，把启停请求委托给 `AnalysisScheduler`
//! - 读取接口只访问 `AnalysisCache` 与组合存储，不等待进行中的分析
//! - 将领域模型转换为 DTO 返回给前端

pub mod error;
pub mod routes;
pub mod server;
pub mod types;
