//! 外部前端集成：目前为 Telegram（长轮询，无需公网 Webhook 域名）

pub mod telegram;
