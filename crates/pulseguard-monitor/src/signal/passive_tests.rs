use super::*;
use chrono::TimeZone;

fn ctx(monitored: &[&str], primary: Option<&str>) -> FallbackContext {
    FallbackContext {
        monitored: monitored.iter().map(|s| EntityId::from(*s)).collect(),
        primary: primary.map(EntityId::from),
    }
}

#[test]
fn test_scan_heartbeat_with_identifier() {
    let hit = scan("2024/05/01 10:00:00 | ERROR | Heartbeat failed for wxid wxid_abc123").unwrap();
    assert_eq!(hit.kind, FailureKind::HeartbeatFailed);
    assert_eq!(hit.entity, Some(EntityId::from("wxid_abc123")));
}

#[test]
fn test_scan_is_case_insensitive_for_ascii_markers() {
    let hit = scan("HEARTBEAT FAILED, retrying").unwrap();
    assert_eq!(hit.kind, FailureKind::HeartbeatFailed);
    assert!(hit.entity.is_none());
}

#[test]
fn test_scan_chinese_markers() {
    assert_eq!(scan("心跳失败 wxid_a").unwrap().kind, FailureKind::HeartbeatFailed);
    assert_eq!(scan("用户可能退出").unwrap().kind, FailureKind::LoggedOut);
    assert_eq!(scan("获取新消息失败").unwrap().kind, FailureKind::FetchFailed);
    assert_eq!(scan("账号不在线").unwrap().kind, FailureKind::Offline);
    assert_eq!(scan("登录异常").unwrap().kind, FailureKind::Offline);
}

#[test]
fn test_scan_ignores_unrelated_text() {
    assert!(scan("received message from wxid_friend: hello").is_none());
    assert!(scan("").is_none());
}

#[test]
fn test_extract_signal_prefers_identifier_in_text() {
    let fallback = ctx(&["wxid_mine"], Some("wxid_primary"));
    let (entity, _) = extract_signal("Heartbeat failed for wxid wxid_other", &fallback).unwrap();
    assert_eq!(entity.as_str(), "wxid_other");
}

#[test]
fn test_extract_signal_falls_back_to_single_monitored() {
    let fallback = ctx(&["wxid_only"], Some("wxid_primary"));
    let (entity, kind) = extract_signal("获取新消息失败", &fallback).unwrap();
    assert_eq!(entity.as_str(), "wxid_only");
    assert_eq!(kind, FailureKind::FetchFailed);
}

#[test]
fn test_extract_signal_falls_back_to_primary() {
    let fallback = ctx(&["wxid_a", "wxid_b"], Some("wxid_primary"));
    let (entity, _) = extract_signal("心跳失败", &fallback).unwrap();
    assert_eq!(entity.as_str(), "wxid_primary");

    let fallback = ctx(&[], Some("wxid_primary"));
    let (entity, _) = extract_signal("心跳失败", &fallback).unwrap();
    assert_eq!(entity.as_str(), "wxid_primary");
}

#[test]
fn test_extract_signal_discards_without_fallback() {
    let fallback = ctx(&["wxid_a", "wxid_b"], None);
    assert!(extract_signal("心跳失败", &fallback).is_none());
}

#[test]
fn test_is_entity_id() {
    assert!(is_entity_id("wxid_abc_123"));
    assert!(!is_entity_id("user wxid_abc"));
    assert!(!is_entity_id("wxid_"));
    assert!(!is_entity_id("filehelper"));
}

#[test]
fn test_inbound_event_accepts_framework_keys() {
    let json = r#"{"MsgType": 10000, "FromWxid": "system", "SenderWxid": "wxid_s", "Content": "用户可能退出"}"#;
    let event: InboundEvent = serde_json::from_str(json).unwrap();
    assert_eq!(event.msg_type, Some(10000));
    assert_eq!(event.from.as_deref(), Some("system"));
    assert_eq!(event.sender.as_deref(), Some("wxid_s"));
    assert_eq!(event.text(), "用户可能退出");
}

#[test]
fn test_observe_builds_event() {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
    let event = PassiveTextEvent
        .observe("Heartbeat failed for wxid wxid_abc", &ctx(&[], None), at, SignalKind::PassiveText)
        .unwrap();
    assert_eq!(event.entity.as_str(), "wxid_abc");
    assert_eq!(event.at, at);
    assert_eq!(event.source, SignalKind::PassiveText);
    assert!(event.reason.contains("Heartbeat failed"));
}

#[test]
fn test_truncate_long_reason() {
    let long = "心".repeat(200);
    let out = truncate(&long, 10);
    assert_eq!(out.chars().count(), 13);
    assert!(out.ends_with("..."));
}
