//! 通知解码器
//!
//! 把推送负载或 HTTP 响应体解码为 `Report`。推送负载有三种线上形态，按固定优先级尝试：
//!
//! 1. `aps.alert` 是 JSON 对象（可见通知）
//! 2. `aps.alert` 是包着报告 JSON 的字符串（旧版可见通知）
//! 3. 顶层 `message` 字符串（后台通知），或 `notification.body` 字符串里的 `{"message": report}`
//!
//! 第一个能结构化解析的形态胜出；三种都失败时返回 `InvalidNotificationStructure`。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, WalletSDKError};
use crate::notifications::model::{
    EventKind, NewOperation, Notification, NotificationId, NotificationPayload, OperationMetadata,
    OperationUpdate, Report,
};

/// 操作元数据解密器
///
/// 密钥不可用或密文损坏时返回 `None`（失败即关闭），绝不抛错。
pub trait OperationMetadataDecrypter: Send + Sync {
    fn decrypt(&self, payload: &str) -> Option<OperationMetadata>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportJson {
    previous_id: NotificationId,
    maximum_id: NotificationId,
    #[serde(default)]
    preview: Vec<NotificationJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationJson {
    id: NotificationId,
    previous_id: NotificationId,
    sender_session_uuid: String,
    message_type: String,
    #[serde(default)]
    message: Value,
}

#[derive(Debug, Deserialize)]
struct ReportContainer {
    message: ReportJson,
}

#[derive(Debug, Deserialize)]
struct FulfillIncomingSwapJson {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct EventJson {
    event: EventKind,
}

/// 通知解码器
#[derive(Clone, Default)]
pub struct NotificationDecoder {
    decrypter: Option<Arc<dyn OperationMetadataDecrypter>>,
}

impl std::fmt::Debug for NotificationDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDecoder")
            .field("has_decrypter", &self.decrypter.is_some())
            .finish()
    }
}

impl NotificationDecoder {
    pub fn new(decrypter: Option<Arc<dyn OperationMetadataDecrypter>>) -> Self {
        Self { decrypter }
    }

    /// 解码推送负载（三种形态按优先级尝试）
    pub fn decode_push(&self, payload: &Value) -> Result<Report> {
        let alert = payload.get("aps").and_then(|aps| aps.get("alert"));

        if let Some(alert @ Value::Object(_)) = alert {
            match serde_json::from_value::<ReportJson>(alert.clone()) {
                Ok(raw) => return self.convert_report(raw),
                Err(e) => debug!("aps.alert 对象不是报告: {}", e),
            }
        }

        if let Some(Value::String(alert)) = alert {
            match serde_json::from_str::<ReportJson>(alert) {
                Ok(raw) => return self.convert_report(raw),
                Err(e) => debug!("aps.alert 字符串不是报告: {}", e),
            }
        }

        if let Some(Value::String(message)) = payload.get("message") {
            match serde_json::from_str::<ReportJson>(message) {
                Ok(raw) => return self.convert_report(raw),
                Err(e) => debug!("message 字段不是报告: {}", e),
            }
        }

        if let Some(Value::String(body)) = payload.get("notification").and_then(|n| n.get("body")) {
            match serde_json::from_str::<ReportContainer>(body) {
                Ok(container) => return self.convert_report(container.message),
                Err(e) => debug!("notification.body 不是报告容器: {}", e),
            }
        }

        Err(WalletSDKError::InvalidNotificationStructure(
            "推送负载不符合任何已知形态".to_string(),
        ))
    }

    /// 解码报告 JSON（HTTP 响应体）
    pub fn decode_report(&self, bytes: &[u8]) -> Result<Report> {
        let raw: ReportJson = serde_json::from_slice(bytes)?;
        self.convert_report(raw)
    }

    /// 宽松解码：在第一条无法解析的通知处截断，返回前面连续的部分和该错误
    pub fn decode_report_lenient(&self, bytes: &[u8]) -> Result<(Report, Option<WalletSDKError>)> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct LooseReport {
            previous_id: NotificationId,
            maximum_id: NotificationId,
            #[serde(default)]
            preview: Vec<Value>,
        }

        let loose: LooseReport = serde_json::from_slice(bytes)?;
        let mut report = Report::empty(loose.previous_id, loose.maximum_id);

        for value in loose.preview {
            let converted = serde_json::from_value::<NotificationJson>(value)
                .map_err(WalletSDKError::from)
                .and_then(|raw| self.convert_notification(raw));
            match converted {
                Ok(notification) => report.preview.push(notification),
                Err(e) => {
                    warn!(
                        "⚠️ 报告中的通知无法解析，截断于此: decoded={}, error={}",
                        report.preview.len(),
                        e
                    );
                    return Ok((report, Some(e)));
                }
            }
        }

        Ok((report, None))
    }

    /// 解码单条通知 JSON
    pub fn decode_notification(&self, bytes: &[u8]) -> Result<Notification> {
        let raw: NotificationJson = serde_json::from_slice(bytes)?;
        self.convert_notification(raw)
    }

    fn convert_report(&self, raw: ReportJson) -> Result<Report> {
        let preview = raw
            .preview
            .into_iter()
            .map(|n| self.convert_notification(n))
            .collect::<Result<Vec<_>>>()?;

        Ok(Report {
            previous_id: raw.previous_id,
            maximum_id: raw.maximum_id,
            preview,
        })
    }

    fn convert_notification(&self, raw: NotificationJson) -> Result<Notification> {
        let message = match raw.message_type.as_str() {
            "operation/new" => {
                let mut new_op: NewOperation = decode_message(&raw, raw.message.clone())?;
                self.attach_metadata(raw.id, &mut new_op);
                NotificationPayload::NewOperation(new_op)
            }
            "operations/update" => {
                let update: OperationUpdate = decode_message(&raw, raw.message.clone())?;
                NotificationPayload::OperationUpdate(update)
            }
            "sessions/authorized" => NotificationPayload::SessionAuthorized,
            "incoming_swap/fulfill" => {
                let fulfill: FulfillIncomingSwapJson = decode_message(&raw, raw.message.clone())?;
                NotificationPayload::FulfillIncomingSwap { uuid: fulfill.uuid }
            }
            "contact/new" => NotificationPayload::NewContact,
            "session/expired" => NotificationPayload::ExpiredSession,
            "contact/update" => NotificationPayload::UpdateContact,
            "challenge/update/authorize" => NotificationPayload::UpdateAuthorizeChallenge,
            "authorize_rc_signin" => NotificationPayload::AuthorizeRcSignIn,
            "users/email_verified" => NotificationPayload::VerifiedEmail,
            "satellite/completePairingAck" => NotificationPayload::CompletePairingAck,
            "satellite/addHardwareWallet" => NotificationPayload::AddHardwareWallet,
            "satellite/withdrawalResult" => NotificationPayload::WithdrawalResult,
            "satellite/getState" => NotificationPayload::GetSatelliteState,
            "event_communication" => {
                let event: EventJson = decode_message(&raw, raw.message.clone())?;
                NotificationPayload::EventCommunication(event.event)
            }
            "no-op" => NotificationPayload::NoOp,
            other => NotificationPayload::UnknownMessage(other.to_string()),
        };

        Ok(Notification {
            id: raw.id,
            previous_id: raw.previous_id,
            sender_session_uuid: raw.sender_session_uuid,
            message,
        })
    }

    /// 解密操作元数据；解密失败时降级为没有元数据的负载
    fn attach_metadata(&self, notification_id: NotificationId, new_op: &mut NewOperation) {
        let Some(decrypter) = &self.decrypter else {
            return;
        };
        let Some(encrypted) = new_op.operation.encrypted_metadata() else {
            return;
        };

        match decrypter.decrypt(encrypted) {
            Some(metadata) => {
                if let Some(description) = &metadata.description {
                    new_op.operation.description = Some(description.clone());
                }
                new_op.operation.metadata = Some(metadata);
            }
            None => {
                warn!(
                    "⚠️ 操作元数据无法解密: notification_id={}, request_id={}",
                    notification_id, new_op.operation.request_id
                );
            }
        }
    }
}

fn decode_message<T: for<'de> Deserialize<'de>>(raw: &NotificationJson, message: Value) -> Result<T> {
    serde_json::from_value(message).map_err(|e| {
        WalletSDKError::InvalidNotificationStructure(format!(
            "通知 {} ({}) 的 message 无法解析: {}",
            raw.id, raw.message_type, e
        ))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notifications::model::{OperationDirection, OperationStatus};
    use serde_json::json;

    pub(crate) fn operation_json(direction: &str) -> Value {
        json!({
            "id": 77,
            "requestId": "req-1",
            "isExternal": true,
            "direction": direction,
            "senderIsExternal": true,
            "receiverIsExternal": false,
            "amount": {
                "inSatoshis": 10_000,
                "inInputCurrency": {"amount": "10000", "currency": "BTC"},
                "inPrimaryCurrency": {"amount": "1.2", "currency": "USD"}
            },
            "fee": {
                "inSatoshis": 240,
                "inInputCurrency": {"amount": "240", "currency": "BTC"},
                "inPrimaryCurrency": {"amount": "0.03", "currency": "USD"}
            },
            "confirmations": 0,
            "exchangeRatesWindowId": 9,
            "status": "BROADCASTED",
            "creationDate": "2021-03-04T12:00:00Z",
            "description": "plain",
            "senderMetadata": "sender-cipher",
            "receiverMetadata": "receiver-cipher"
        })
    }

    pub(crate) fn report_json() -> Value {
        json!({
            "previousId": 0,
            "maximumId": 3,
            "preview": [
                {"id": 1, "previousId": 0, "senderSessionUuid": "s-1", "messageType": "no-op", "message": {}},
                {"id": 2, "previousId": 1, "senderSessionUuid": "s-1", "messageType": "operation/new",
                 "message": {"operation": operation_json("INCOMING"), "nextTransactionSize": {
                     "sizeProgression": [{"amountInSatoshis": 5000, "sizeInBytes": 400, "outpoint": "ab:0"}],
                     "validAtOperationHid": 3,
                     "expectedDebtInSat": 0
                 }}},
                {"id": 3, "previousId": 2, "senderSessionUuid": "s-1", "messageType": "event_communication",
                 "message": {"event": "TAPROOT_ACTIVATED"}}
            ]
        })
    }

    struct EchoDecrypter;

    impl OperationMetadataDecrypter for EchoDecrypter {
        fn decrypt(&self, payload: &str) -> Option<OperationMetadata> {
            if payload == "receiver-cipher" {
                Some(OperationMetadata {
                    lnurl_sender: None,
                    description: Some("decrypted".into()),
                    invoice: None,
                })
            } else {
                None
            }
        }
    }

    #[test]
    fn decodes_alert_object_shape() {
        let decoder = NotificationDecoder::default();
        let payload = json!({"aps": {"alert": report_json()}});
        let report = decoder.decode_push(&payload).unwrap();

        assert_eq!(report.previous_id, 0);
        assert_eq!(report.maximum_id, 3);
        assert_eq!(report.preview.len(), 3);
        assert_eq!(report.preview[0].message, NotificationPayload::NoOp);
        assert_eq!(
            report.preview[2].message,
            NotificationPayload::EventCommunication(EventKind::TaprootActivated)
        );
        match &report.preview[1].message {
            NotificationPayload::NewOperation(op) => {
                assert_eq!(op.operation.direction, OperationDirection::Incoming);
                assert_eq!(op.operation.status, OperationStatus::Broadcasted);
                assert_eq!(op.next_transaction_size.total_balance(), 5000);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn decodes_alert_string_shape() {
        let decoder = NotificationDecoder::default();
        let payload = json!({"aps": {"alert": report_json().to_string()}});
        let report = decoder.decode_push(&payload).unwrap();
        assert_eq!(report.last_id(), Some(3));
    }

    #[test]
    fn decodes_background_message_and_body_shapes() {
        let decoder = NotificationDecoder::default();

        let background = json!({"message": report_json().to_string()});
        assert_eq!(decoder.decode_push(&background).unwrap().maximum_id, 3);

        let body = json!({"message": report_json()}).to_string();
        let visual = json!({"notification": {"body": body}});
        assert_eq!(decoder.decode_push(&visual).unwrap().preview.len(), 3);
    }

    #[test]
    fn alert_object_wins_over_message_field() {
        let decoder = NotificationDecoder::default();
        let other = json!({"previousId": 7, "maximumId": 7, "preview": []});
        let payload = json!({
            "aps": {"alert": report_json()},
            "message": other.to_string()
        });
        assert_eq!(decoder.decode_push(&payload).unwrap().maximum_id, 3);
    }

    #[test]
    fn unparseable_push_is_invalid_structure() {
        let decoder = NotificationDecoder::default();
        let payload = json!({"aps": {"alert": "You have a new payment"}, "foo": 1});
        let err = decoder.decode_push(&payload).unwrap_err();
        assert!(matches!(err, WalletSDKError::InvalidNotificationStructure(_)));
    }

    #[test]
    fn unknown_message_type_is_not_a_decode_error() {
        let decoder = NotificationDecoder::default();
        let body = json!({
            "id": 4, "previousId": 3, "senderSessionUuid": "s",
            "messageType": "future/thing", "message": {"x": 1}
        });
        let notification = decoder.decode_notification(body.to_string().as_bytes()).unwrap();
        assert_eq!(
            notification.message,
            NotificationPayload::UnknownMessage("future/thing".into())
        );
    }

    #[test]
    fn decrypted_description_overrides_plaintext() {
        let decoder = NotificationDecoder::new(Some(Arc::new(EchoDecrypter)));
        let report = decoder
            .decode_report(report_json().to_string().as_bytes())
            .unwrap();
        let NotificationPayload::NewOperation(op) = &report.preview[1].message else {
            panic!("expected new operation");
        };
        assert_eq!(op.operation.description.as_deref(), Some("decrypted"));
        assert!(op.operation.metadata.is_some());
    }

    #[test]
    fn undecryptable_metadata_degrades_gracefully() {
        let decoder = NotificationDecoder::new(Some(Arc::new(EchoDecrypter)));
        let mut report = report_json();
        report["preview"][1]["message"]["operation"] = operation_json("OUTGOING");
        let report = decoder.decode_report(report.to_string().as_bytes()).unwrap();
        let NotificationPayload::NewOperation(op) = &report.preview[1].message else {
            panic!("expected new operation");
        };
        assert_eq!(op.operation.description.as_deref(), Some("plain"));
        assert!(op.operation.metadata.is_none());
    }

    #[test]
    fn lenient_decode_keeps_prefix_before_bad_entry() {
        let decoder = NotificationDecoder::default();
        let mut report = report_json();
        report["preview"][1]["message"] = json!({"broken": true});
        let (report, error) = decoder
            .decode_report_lenient(report.to_string().as_bytes())
            .unwrap();
        assert_eq!(report.preview.len(), 1);
        assert_eq!(report.maximum_id, 3);
        assert!(matches!(error, Some(WalletSDKError::InvalidNotificationStructure(_))));
    }

    #[test]
    fn dates_accept_fractional_seconds() {
        let decoder = NotificationDecoder::default();
        let mut report = report_json();
        report["preview"][1]["message"]["operation"]["creationDate"] =
            json!("2021-03-04T12:00:00.123Z");
        assert!(decoder.decode_report(report.to_string().as_bytes()).is_ok());
    }
}
