use super::*;

#[test]
fn test_session_state_string() {
    let tests = vec![
        (SessionState::Running, "Running"),
        (SessionState::Completed, "Completed"),
        (SessionState::Failed, "Failed"),
    ];

    for (state, expected_string) in tests {
        assert_eq!(state.to_string(), expected_string, "testCase: {state:?}");
    }
}

#[test]
fn test_role() {
    assert_eq!(Role::default(), Role::Controlling);
    assert!(Role::Controlling.is_controlling());
    assert!(!Role::Controlled.is_controlling());
    assert_eq!(Role::Controlling.opposite(), Role::Controlled);
    assert_eq!(Role::Controlled.opposite(), Role::Controlling);
    assert_eq!(Role::Controlled.to_string(), "controlled");
}
