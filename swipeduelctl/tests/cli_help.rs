use assert_cmd::cargo::cargo_bin_cmd;

fn help_text(args: &[&str]) -> String {
    let mut cmd = cargo_bin_cmd!("swipeduelctl");
    let output = cmd
        .args(args)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn top_level_help_lists_commands() {
    let text = help_text(&[]);
    for command in ["swipe", "status", "clear"] {
        assert!(text.contains(command), "help missing '{command}'");
    }
}

#[test]
fn swipe_help_mentions_options() {
    let text = help_text(&["swipe"]);
    assert!(text.contains("--gender"), "swipe help missing --gender");
    assert!(text.contains("--pairs"), "swipe help missing --pairs");
    assert!(text.contains("--vote"), "swipe help missing --vote");
}

#[test]
fn unknown_gender_is_rejected() {
    let mut cmd = cargo_bin_cmd!("swipeduelctl");
    cmd.args(["swipe", "--gender", "other"]).assert().failure();
}
