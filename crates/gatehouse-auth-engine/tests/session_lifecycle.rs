//! Session cookie lifecycle across requests: rotation, chunking, tampering
//! and expiry windows.

mod common;

use std::sync::Arc;

use common::{BrowserJar, MockOidc, SECRET_1, SECRET_2, T0, test_config};
use gatehouse_auth_engine::config::{AbsoluteDurationSetting, ConfigLayer};
use gatehouse_auth_engine::cookies::ResponseCookies;
use gatehouse_auth_engine::{AuthManager, Claims, ManualClock, Session};

fn manager(overrides: ConfigLayer, clock: &Arc<ManualClock>) -> AuthManager {
    AuthManager::new(test_config(overrides), Arc::new(MockOidc::new()))
        .unwrap()
        .with_clock(clock.clone())
}

fn secrets(values: &[&str]) -> ConfigLayer {
    ConfigLayer {
        secrets: Some(values.iter().map(|s| (*s).into()).collect()),
        ..Default::default()
    }
}

fn user(sub: &str) -> Session {
    let mut claims = Claims::new();
    claims.insert("sub", sub);
    claims.insert("email", format!("{sub}@example.com"));
    Session::new(claims, T0)
}

fn establish(manager: &AuthManager, jar: &mut BrowserJar, session: Session) {
    let mut response = ResponseCookies::new();
    manager
        .session_cache(jar.request())
        .establish(session, &mut response)
        .unwrap();
    jar.apply(&response);
}

fn touch(manager: &AuthManager, jar: &mut BrowserJar) -> bool {
    let mut response = ResponseCookies::new();
    let touched = manager
        .session_cache(jar.request())
        .touch(&mut response)
        .unwrap();
    jar.apply(&response);
    touched
}

fn subject(manager: &AuthManager, jar: &BrowserJar) -> Option<String> {
    manager
        .session_cache(jar.request())
        .get()
        .and_then(|s| s.claims.subject().map(String::from))
}

fn expires_at(manager: &AuthManager, jar: &BrowserJar) -> Option<i64> {
    manager
        .session_cache(jar.request())
        .record()
        .map(|r| r.expires_at)
}

#[test]
fn cookie_survives_secret_rotation() {
    let clock = Arc::new(ManualClock::new(T0));
    let mut jar = BrowserJar::new();

    let old = manager(secrets(&[SECRET_1]), &clock);
    establish(&old, &mut jar, user("rotating"));

    // New secret first, old one still accepted.
    let rotated = manager(secrets(&[SECRET_2, SECRET_1]), &clock);
    assert_eq!(subject(&rotated, &jar).as_deref(), Some("rotating"));

    // A rewrite seals under the new secret only.
    clock.advance(10);
    assert!(touch(&rotated, &mut jar));
    let new_only = manager(secrets(&[SECRET_2]), &clock);
    assert_eq!(subject(&new_only, &jar).as_deref(), Some("rotating"));
    assert_eq!(subject(&old, &jar), None);
}

#[test]
fn unknown_secret_reads_as_no_session() {
    let clock = Arc::new(ManualClock::new(T0));
    let mut jar = BrowserJar::new();
    establish(&manager(secrets(&[SECRET_1]), &clock), &mut jar, user("u"));

    let stranger = manager(secrets(&[SECRET_2]), &clock);
    assert_eq!(subject(&stranger, &jar), None);
}

#[test]
fn large_session_spans_several_cookies() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(ConfigLayer::default(), &clock);
    let mut jar = BrowserJar::new();

    let mut session = user("big");
    let groups: Vec<String> = (0..600).map(|i| format!("group-{i:05}")).collect();
    session.claims.insert("groups", groups.clone());
    establish(&manager, &mut jar, session);

    let names = jar.names();
    assert!(!names.iter().any(|n| n == "appSession"));
    for chunk in ["appSession.0", "appSession.1", "appSession.2"] {
        assert!(names.iter().any(|n| n == chunk), "missing {chunk}");
    }
    for name in &names {
        assert!(jar.get(name).unwrap().len() <= 4000);
    }

    let mut cache = manager.session_cache(jar.request());
    let restored = cache.get().unwrap();
    assert_eq!(restored.claims.get("groups"), Some(&serde_json::json!(groups)));

    // Shrinking back to one cookie clears every chunk.
    let mut response = ResponseCookies::new();
    cache.update(user("small"), &mut response).unwrap();
    jar.apply(&response);
    assert_eq!(jar.names(), vec!["appSession".to_string()]);
    assert_eq!(subject(&manager, &jar).as_deref(), Some("small"));
}

#[test]
fn missing_chunk_reads_as_no_session() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(ConfigLayer::default(), &clock);
    let mut jar = BrowserJar::new();
    let mut session = user("big");
    session.claims.insert("blob", "x".repeat(9000));
    establish(&manager, &mut jar, session);

    jar.remove("appSession.1");
    assert_eq!(subject(&manager, &jar), None);
}

#[test]
fn tampered_cookie_reads_as_no_session() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(ConfigLayer::default(), &clock);
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));

    let original = jar.get("appSession").unwrap().to_string();
    let last = original.len() - 1;
    let flipped = if &original[last..] == "A" { "B" } else { "A" };
    jar.set("appSession", &format!("{}{flipped}", &original[..last]));
    assert_eq!(subject(&manager, &jar), None);

    jar.set("appSession", "not-a-session");
    assert_eq!(subject(&manager, &jar), None);
}

#[test]
fn absolute_session_expires() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(
        ConfigLayer {
            session_rolling: Some(false),
            session_absolute_duration: Some(AbsoluteDurationSetting::Seconds(3600)),
            ..Default::default()
        },
        &clock,
    );
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 3600));

    // Touching an absolute session changes nothing.
    clock.set(T0 + 1800);
    assert!(!touch(&manager, &mut jar));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 3600));

    clock.set(T0 + 3600);
    assert!(subject(&manager, &jar).is_some());
    clock.set(T0 + 3601);
    assert_eq!(subject(&manager, &jar), None);
}

#[test]
fn rolling_session_extends_up_to_absolute_cap() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(
        ConfigLayer {
            session_rolling_duration: Some(600),
            session_absolute_duration: Some(AbsoluteDurationSetting::Seconds(1800)),
            ..Default::default()
        },
        &clock,
    );
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 600));

    clock.set(T0 + 500);
    assert!(touch(&manager, &mut jar));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 1100));

    clock.set(T0 + 1000);
    assert!(touch(&manager, &mut jar));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 1600));

    clock.set(T0 + 1500);
    assert!(touch(&manager, &mut jar));
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 1800));

    clock.set(T0 + 1801);
    assert_eq!(subject(&manager, &jar), None);
    assert!(!touch(&manager, &mut jar));
}

#[test]
fn idle_rolling_session_lapses() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(
        ConfigLayer {
            session_rolling_duration: Some(600),
            ..Default::default()
        },
        &clock,
    );
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));
    clock.set(T0 + 601);
    assert_eq!(subject(&manager, &jar), None);
}

#[test]
fn rolling_without_absolute_cap_keeps_going() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(
        ConfigLayer {
            session_rolling_duration: Some(600),
            session_absolute_duration: Some(AbsoluteDurationSetting::Enabled(false)),
            ..Default::default()
        },
        &clock,
    );
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));
    for step in 1..=20 {
        clock.set(T0 + step * 500);
        assert!(touch(&manager, &mut jar));
    }
    assert_eq!(expires_at(&manager, &jar), Some(T0 + 10_000 + 600));
}

#[test]
fn session_cookie_is_decoded_once_per_request() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(ConfigLayer::default(), &clock);
    let mut jar = BrowserJar::new();
    establish(&manager, &mut jar, user("u"));

    let mut cache = manager.session_cache(jar.request());
    assert_eq!(cache.load_count(), 0);
    assert!(cache.get().is_some());
    assert!(manager.get_session(&mut cache).is_some());
    assert!(cache.record().is_some());
    assert_eq!(cache.load_count(), 1);
}

#[test]
fn destroy_expires_every_chunk() {
    let clock = Arc::new(ManualClock::new(T0));
    let manager = manager(ConfigLayer::default(), &clock);
    let mut jar = BrowserJar::new();
    let mut session = user("big");
    session.claims.insert("blob", "y".repeat(9000));
    establish(&manager, &mut jar, session);
    assert!(jar.names().len() >= 3);

    let mut response = ResponseCookies::new();
    manager.session_cache(jar.request()).destroy(&mut response);
    jar.apply(&response);
    assert!(jar.names().is_empty());
}
