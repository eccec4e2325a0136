pub mod health;
pub mod logs;
pub mod run;
pub mod ws;
