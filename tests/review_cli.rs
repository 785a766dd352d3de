#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

const FAKE_SCANNER: &str = r#"
for last; do :; done
report="$REPORT_DIR/$(printf '%s' "$last" | tr '/:@' '___').json"
if [ -f "$report" ]; then
  cat "$report"
else
  echo "FATAL: unable to find image $last" >&2
  exit 1
fi
"#;

fn imagegate_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_imagegate"));
    cmd.env("HOME", home);
    cmd.env("RUST_LOG", "off");
    cmd.env_remove("IMAGEGATE_CONFIG");
    cmd.env_remove("IMAGEGATE_SCANNER_COMMAND");
    cmd.env_remove("IMAGEGATE_SCANNER_ARGS");
    cmd.env_remove("IMAGEGATE_SCANNER_TIMEOUT_SECS");
    cmd.env_remove("IMAGEGATE_POLICY_SEVERITY");
    cmd.env_remove("IMAGEGATE_SERVER_LISTEN");
    cmd.env_remove("IMAGEGATE_SERVER_TLS_CERT");
    cmd.env_remove("IMAGEGATE_SERVER_TLS_KEY");
    cmd.env_remove("IMAGEGATE_LOG_JSON");
    cmd
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "imagegate-review-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

/// Installs a scanner script that replays `<home>/reports/<image>.json`.
/// It is run through `sh` so the test never execs a freshly written file.
fn install_fake_scanner(home: &Path) {
    let script = home.join("fake-trivy.sh");
    write_file(&script, FAKE_SCANNER.as_bytes());
    let reports = home.join("reports");
    std::fs::create_dir_all(&reports).expect("mkdir reports");

    let config = format!(
        r#"
[scanner]
command = "sh"
args = ["-c", "REPORT_DIR='{reports}'; . '{script}'", "fake-trivy", "image", "--format", "json"]
timeout_secs = 30
"#,
        reports = reports.display(),
        script = script.display(),
    );
    write_file(
        home.join(".config/imagegate/config.toml").as_path(),
        config.as_bytes(),
    );
}

fn add_report(home: &Path, image: &str, severities: &[&str]) {
    let vulnerabilities: Vec<serde_json::Value> = severities
        .iter()
        .enumerate()
        .map(|(i, sev)| {
            serde_json::json!({
                "VulnerabilityID": format!("CVE-2024-{i:04}"),
                "PkgName": "openssl",
                "InstalledVersion": "3.0.11",
                "Severity": sev,
                "Description": "test vulnerability"
            })
        })
        .collect();
    let report = serde_json::json!({
        "SchemaVersion": 2,
        "ArtifactName": image,
        "Results": [
            {"Target": format!("{image} (debian 12.4)"), "Class": "os-pkgs", "Type": "debian",
             "Vulnerabilities": vulnerabilities}
        ]
    });
    let name = image.replace(['/', ':', '@'], "_");
    write_file(
        home.join("reports").join(format!("{name}.json")).as_path(),
        serde_json::to_string(&report).expect("serialize report").as_bytes(),
    );
}

fn write_review(home: &Path, images: &[&str]) -> PathBuf {
    let containers: Vec<serde_json::Value> = images
        .iter()
        .map(|image| serde_json::json!({ "image": image }))
        .collect();
    let review = serde_json::json!({
        "apiVersion": "imagepolicy.k8s.io/v1alpha1",
        "kind": "ImageReview",
        "spec": {
            "containers": containers,
            "annotations": {"mycluster.image-policy.k8s.io/ticket-1234": "break-glass"},
            "namespace": "default"
        }
    });
    let path = home.join("review.json");
    write_file(
        &path,
        serde_json::to_string_pretty(&review)
            .expect("serialize review")
            .as_bytes(),
    );
    path
}

fn review(home: &Path, images: &[&str]) -> (Output, serde_json::Value) {
    let path = write_review(home, images);
    let out = imagegate_cmd(home)
        .arg("review")
        .arg(&path)
        .output()
        .expect("run imagegate");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap_or_else(|err| {
        panic!(
            "parse decision: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    });
    (out, v)
}

#[test]
fn critical_finding_denies_image() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "nginx:1.0", &["CRITICAL"]);

    let (out, v) = review(&home, &["nginx:1.0"]);
    assert!(out.status.success());
    assert_eq!(v["apiVersion"], "imagepolicy.k8s.io/v1alpha1");
    assert_eq!(v["kind"], "ImageReview");
    assert_eq!(v["status"]["allowed"], false);
    assert_eq!(v["status"]["reason"], "image nginx:1.0 has vulnerabilities");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn images_without_findings_are_allowed() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "nginx:1.0", &[]);
    add_report(&home, "redis:6", &[]);

    let (out, v) = review(&home, &["nginx:1.0", "redis:6"]);
    assert!(out.status.success());
    assert_eq!(v["status"]["allowed"], true);
    assert!(v["status"].get("reason").is_none());

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn failed_scan_is_skipped_and_others_still_decide() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "b", &["CRITICAL"]);

    let (out, v) = review(&home, &["a", "b"]);
    assert!(out.status.success());
    assert_eq!(v["status"]["allowed"], false);
    assert_eq!(v["status"]["reason"], "image b has vulnerabilities");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn high_only_findings_are_below_default_threshold() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "registry.example.com/team/api:2.1", &["HIGH", "HIGH"]);

    let (out, v) = review(&home, &["registry.example.com/team/api:2.1"]);
    assert!(out.status.success());
    assert_eq!(v["status"]["allowed"], true);

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn policy_severity_env_changes_threshold() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "redis:6", &["HIGH"]);
    let path = write_review(&home, &["redis:6"]);

    let out = imagegate_cmd(&home)
        .env("IMAGEGATE_POLICY_SEVERITY", "high")
        .arg("review")
        .arg(&path)
        .output()
        .expect("run imagegate");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse decision");
    assert_eq!(v["status"]["reason"], "image redis:6 has vulnerabilities");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn reasons_are_sorted_by_image_reference() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "zeta:1", &["CRITICAL"]);
    add_report(&home, "alpha:1", &["LOW", "CRITICAL"]);

    let (_, v) = review(&home, &["zeta:1", "alpha:1"]);
    assert_eq!(
        v["status"]["reason"],
        "image alpha:1 has vulnerabilities, image zeta:1 has vulnerabilities"
    );

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn review_reads_stdin_and_prints_indented_json() {
    let home = make_temp_home();
    install_fake_scanner(&home);

    let mut child = imagegate_cmd(&home)
        .args(["review", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn imagegate");
    {
        use std::io::Write;
        let mut stdin = child.stdin.take().expect("stdin");
        stdin
            .write_all(br#"{"apiVersion":"imagepolicy.k8s.io/v1alpha1","kind":"ImageReview","spec":{"containers":[]}}"#)
            .expect("write stdin");
    }
    let out = child.wait_with_output().expect("wait imagegate");
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout),
        format!("{}\n", include_str!("golden/decision_allowed.json"))
    );

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn scan_json_summary_lists_flagged_images() {
    let home = make_temp_home();
    install_fake_scanner(&home);
    add_report(&home, "nginx:1.0", &["CRITICAL", "MEDIUM", "CRITICAL"]);
    add_report(&home, "redis:6", &["LOW"]);

    let out = imagegate_cmd(&home)
        .args(["--json", "scan", "nginx:1.0", "redis:6", "missing:1"])
        .output()
        .expect("run imagegate");
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse summary");
    assert_eq!(v["threshold"], "CRITICAL");
    assert_eq!(
        v["scanned"],
        serde_json::json!(["nginx:1.0", "redis:6", "missing:1"])
    );
    let images = v["images"].as_object().expect("images object");
    assert_eq!(images.len(), 1);
    let entries = images["nginx:1.0"].as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["Target"], "nginx:1.0");
    assert_eq!(
        entries[0]["Vulnerabilities"].as_array().map(Vec::len),
        Some(2)
    );
    assert_eq!(v["decision"]["status"]["allowed"], false);

    let _ = std::fs::remove_dir_all(&home);
}
