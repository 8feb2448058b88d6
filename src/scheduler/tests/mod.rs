//! Scheduler 单元测试

mod scheduler;
