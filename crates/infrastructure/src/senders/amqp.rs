use async_trait::async_trait;
use lapin::{options::*, BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use hookcast_core::{Destination, HookcastError, HookcastResult, IncomingEvent, Sender};

use super::Envelope;

const MAX_QUEUE_NAME_BYTES: usize = 255;

struct AmqpLink {
    connection: Connection,
    channel: Channel,
}

impl AmqpLink {
    fn is_usable(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// 发布到以回调地址命名的队列（默认交换机，持久化投递）
///
/// 连接在第一次发送时建立，断开后在下一次发送时重建。
pub struct AmqpSender {
    url: String,
    link: Mutex<Option<AmqpLink>>,
}

impl AmqpSender {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            link: Mutex::new(None),
        }
    }

    /// 队列名错误属于配置问题，不可重试
    pub fn validate_queue_name(name: &str) -> HookcastResult<()> {
        if name.is_empty() {
            return Err(HookcastError::Unretryable("队列名为空".to_string()));
        }
        if name.len() > MAX_QUEUE_NAME_BYTES {
            return Err(HookcastError::Unretryable(format!(
                "队列名超过 {MAX_QUEUE_NAME_BYTES} 字节: {name}"
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(HookcastError::Unretryable(format!("队列名包含空白字符: {name:?}")));
        }
        Ok(())
    }

    async fn connect(&self) -> HookcastResult<AmqpLink> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| HookcastError::Network(format!("连接RabbitMQ失败: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| HookcastError::Network(format!("创建通道失败: {e}")))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| HookcastError::Network(format!("开启发布确认失败: {e}")))?;

        info!("成功连接到RabbitMQ");
        Ok(AmqpLink {
            connection,
            channel,
        })
    }

    /// 只在检查和重建连接时持锁，发布和确认在锁外进行
    async fn channel(&self) -> HookcastResult<Channel> {
        let mut link = self.link.lock().await;
        if let Some(active) = link.as_ref().filter(|active| active.is_usable()) {
            return Ok(active.channel.clone());
        }
        if link.is_some() {
            warn!("RabbitMQ连接已断开，重新连接");
        }
        let fresh = self.connect().await?;
        let channel = fresh.channel.clone();
        *link = Some(fresh);
        Ok(channel)
    }

    pub async fn close(&self) -> HookcastResult<()> {
        if let Some(link) = self.link.lock().await.take() {
            link.connection
                .close(200, "正常关闭")
                .await
                .map_err(|e| HookcastError::Network(format!("关闭连接失败: {e}")))?;
            info!("RabbitMQ连接已关闭");
        }
        Ok(())
    }
}

#[async_trait]
impl Sender for AmqpSender {
    fn name(&self) -> &str {
        "amqp"
    }

    #[instrument(skip_all, fields(event_key = %event.event_key, destination = %destination.name()))]
    async fn send_event(&self, event: &IncomingEvent, destination: &Destination) -> HookcastResult<()> {
        let queue = destination.callback_url().trim();
        Self::validate_queue_name(queue)?;
        let payload = serde_json::to_vec(&Envelope::new(event, destination))?;

        let channel = self.channel().await?;
        let confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| HookcastError::Network(format!("发布消息到队列 {queue} 失败: {e}")))?;

        let confirmation = confirm
            .await
            .map_err(|e| HookcastError::Network(format!("消息发布确认失败: {e}")))?;
        if confirmation.is_nack() {
            return Err(HookcastError::Network(format!("队列 {queue} 拒绝了消息")));
        }

        debug!("消息已发布到队列: {}", queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookcast_core::Configuration;
    use std::sync::Arc;

    #[test]
    fn test_queue_name_rules() {
        assert!(AmqpSender::validate_queue_name("search.events").is_ok());
        assert!(AmqpSender::validate_queue_name(&"q".repeat(255)).is_ok());

        for bad in [String::new(), "q".repeat(256), "search events".to_string(), "tab\tq".to_string()] {
            assert!(AmqpSender::validate_queue_name(&bad).unwrap_err().is_unretryable());
        }
    }

    #[tokio::test]
    async fn test_invalid_queue_fails_before_connecting() {
        // 不可达的地址：若尝试连接会得到网络错误而不是不可重试错误
        let sender = AmqpSender::new("amqp://127.0.0.1:1/%2f");
        let destination = Destination::new(Arc::new(
            Configuration::new("audit").with_callback_url("audit queue"),
        ));
        let event = IncomingEvent::new("product.update", "core").with_target_id("p-1");

        let err = sender.send_event(&event, &destination).await.unwrap_err();
        assert!(err.is_unretryable());
    }

    #[tokio::test]
    async fn test_failed_connect_releases_link() {
        let sender = AmqpSender::new("amqp://127.0.0.1:1/%2f");
        let destination = Destination::new(Arc::new(
            Configuration::new("audit").with_callback_url("audit.events"),
        ));
        let event = IncomingEvent::new("product.update", "core").with_target_id("p-1");

        let (first, second) = tokio::join!(
            sender.send_event(&event, &destination),
            sender.send_event(&event, &destination)
        );
        assert!(!first.unwrap_err().is_unretryable());
        assert!(!second.unwrap_err().is_unretryable());

        let link = sender.link.try_lock().unwrap();
        assert!(link.is_none());
    }
}
