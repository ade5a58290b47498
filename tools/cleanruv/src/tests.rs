use crate::error::CleanRuvError;
use crate::session::{run_session, SessionConfig};
use crate::test_utils::{MockDirectory, ScriptedOperator};

fn session_config() -> SessionConfig {
    SessionConfig {
        base_dn: "dc=example,dc=com".to_string(),
        host: "ipa1.example.com".to_string(),
        dry_run: false,
    }
}

fn topology() -> Vec<String> {
    vec![
        "{replicageneration} 5fa1c2d3000000010000".to_string(),
        "{replica 4 ldap://ipa1.example.com:389} 5fa1c2d4000000040000 5fa2e8a1000100040000"
            .to_string(),
        "{replica 5 ldap://ipa2.example.com:389} 5fa1c2e0000000050000 5fa2e8b0000000050000"
            .to_string(),
        "{replica 7}".to_string(),
        "{replica 9} 5fa1c2f3000000090000 5fa1c2f3000000090000".to_string(),
    ]
}

#[tokio::test]
async fn test_no_tombstone_exits_without_prompting() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::default();
    let mut operator = ScriptedOperator::default();

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("session should end cleanly");

    assert_eq!(dir.searches, 1);
    assert!(operator.prompts.is_empty());
    assert_eq!(
        operator.output,
        vec!["No RUVs were found at ipa1.example.com".to_string()]
    );
}

#[tokio::test]
async fn test_search_failure_is_fatal() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::default();
    dir.search_error = Some("InvalidCredentials".to_string());
    let mut operator = ScriptedOperator::default();

    let result = run_session(&mut dir, &mut operator, &session_config()).await;

    assert_eq!(
        result,
        Err(CleanRuvError::DirectoryUnavailable(
            "InvalidCredentials".to_string()
        ))
    );
    assert!(operator.prompts.is_empty());
}

#[tokio::test]
async fn test_fix_ghosts_then_exit() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::with_records(topology());
    let mut operator = ScriptedOperator::default();

    // cycle 1: fix ghosts, delete replica 7, ignore replica 9
    operator.push_line("2");
    operator.push_line("1");
    operator.push_confirm(true);
    operator.push_line("0");
    // cycle 2: exit
    operator.push_line("0");

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("session should end cleanly");

    assert_eq!(dir.searches, 2);
    assert_eq!(
        dir.modifies,
        vec![(
            "cn=replica,cn=dc\\3Dexample,dc\\3Dcom,cn=mapping tree,cn=config".to_string(),
            "nsds5task".to_string(),
            vec!["CLEANRUV7".to_string()]
        )]
    );

    // The deletion only shows up on the next query.
    assert!(operator.saw(" Ghosts: 2 !!!!!!!!!!!!!!"));
    assert!(operator.saw(" Ghosts: 1 !!!!!!!!!!!!!!"));
    assert!(!dir.records().contains(&"{replica 7}".to_string()));
    assert_eq!(dir.records().len(), 4);
}

#[tokio::test]
async fn test_modify_failure_keeps_session_alive() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::with_records(topology());
    dir.modify_error = Some("Other - connection reset".to_string());
    let mut operator = ScriptedOperator::default();

    operator.push_line("2");
    operator.push_line("1");
    operator.push_confirm(true);
    operator.push_line("1");
    operator.push_confirm(true);
    operator.push_line("0");

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("a failed cleanup must not end the session with an error");

    assert!(dir.modifies.is_empty());
    assert_eq!(dir.searches, 2);
    assert!(operator.saw("connection reset"));
    // both ghosts are still there on the second cycle
    assert_eq!(
        operator
            .output
            .iter()
            .filter(|o| o.contains(" Ghosts: 2 !!!!!!!!!!!!!!"))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_see_all_and_invalid_menu_input() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::with_records(topology());
    let mut operator = ScriptedOperator::default();

    operator.push_line("1");
    operator.push_line("banana");
    operator.push_line("0");

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("session should end cleanly");

    assert_eq!(dir.searches, 3);
    assert!(dir.modifies.is_empty());
    assert!(operator.saw(" Generation - {replicageneration} 5fa1c2d3000000010000"));
    assert!(operator.saw(" *Ghost - {replica 7}"));
    assert!(operator
        .prompts
        .iter()
        .any(|p| p == "[Enter to continue]"));
}

#[tokio::test]
async fn test_fix_not_offered_without_ghosts() {
    let _ = tracing_subscriber::fmt::try_init();
    let healthy: Vec<String> = topology()
        .into_iter()
        .filter(|r| r.contains("ldap://") || r.contains("replicageneration"))
        .collect();
    let mut dir = MockDirectory::with_records(healthy);
    let mut operator = ScriptedOperator::default();

    // "2" is not an option here, so it's just another cycle.
    operator.push_line("2");
    operator.push_line("0");

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("session should end cleanly");

    assert_eq!(dir.searches, 2);
    assert!(dir.modifies.is_empty());
    assert!(operator.saw(" Ghosts: 0"));
    assert!(!operator.prompts.iter().any(|p| p.contains("Fix Ghost")));
}

#[tokio::test]
async fn test_closed_input_ends_session() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut dir = MockDirectory::with_records(topology());
    let mut operator = ScriptedOperator::default();

    run_session(&mut dir, &mut operator, &session_config())
        .await
        .expect("session should end cleanly");

    assert_eq!(dir.searches, 1);
    assert!(dir.modifies.is_empty());
}
