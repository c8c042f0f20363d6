use super::*;

#[test]
fn test_defaults_match_documented_values() {
    let config = Config::default();
    assert!(!config.basic.enable);
    assert_eq!(config.basic.command_prefix, "pg_");
    assert_eq!(config.pushplus.channel, "wechat");
    assert_eq!(config.pushplus.endpoint, "http://www.pushplus.plus/send");
    assert_eq!(config.notification.check_interval, 5);
    assert_eq!(config.notification.status_poll_interval, 2);
    assert_eq!(config.notification.retry_times, 3);
    assert_eq!(config.notification.retry_interval, 60);
    assert_eq!(config.notification.heartbeat_threshold, 3);
    assert_eq!(config.notification.failure_window, 300);
    assert_eq!(config.notification.min_resend_interval, 3600);
    assert_eq!(config.notification.request_timeout, 5);
    assert_eq!(config.status.base_url, "http://127.0.0.1:9000");
    assert_eq!(config.evidence.replay_lines, 10);
}

#[test]
fn test_duration_helpers() {
    let n = NotificationConfig::default();
    assert_eq!(n.failure_window(), Duration::from_secs(300));
    assert_eq!(n.min_resend_interval(), Duration::from_secs(3600));
    assert_eq!(n.request_timeout(), Duration::from_secs(5));
}

#[test]
fn test_serialize_with_entities() {
    let mut config = Config::default();
    config.entities.push(EntityConfig::new("wxid_a"));
    config.entities.push(EntityConfig::new("wxid_b").with_target("tok-b"));

    let text = toml::to_string_pretty(&config).unwrap();
    assert!(text.contains("[[entities]]"));

    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_templates_have_entity_placeholder() {
    let m = MessageConfig::default();
    assert!(m.content_template.contains("{entity}"));
    assert!(m.test_content_template.contains("{entity}"));
    assert!(m.title_template.contains("{time}"));
}
