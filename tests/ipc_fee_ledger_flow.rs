use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_skad");
    let mut child = Command::new(exe)
        .env_remove("SKAD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn skad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded",
        method
    );
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn class_id(classes: &serde_json::Value, name: &str) -> String {
    classes["classes"]
        .as_array()
        .expect("classes array")
        .iter()
        .find(|c| c["name"] == name)
        .and_then(|c| c["id"].as_str())
        .expect("class id")
        .to_string()
}

#[test]
fn fee_ledger_flow_from_structure_to_receipts() {
    let workspace = temp_dir("skad-fee-ledger");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let years = request_ok(&mut stdin, &mut reader, "2", "years.list", json!({}));
    let year = years["current"].as_str().expect("current year").to_string();
    let classes = request_ok(&mut stdin, &mut reader, "3", "classes.list", json!({}));
    assert_eq!(classes["classes"].as_array().map(|a| a.len()), Some(16));
    let class5 = class_id(&classes, "5");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.add",
        json!({
            "firstName": "Asha",
            "lastName": "Rao",
            "gender": "Female",
            "classId": class5,
        }),
    );
    let student_id = student["student"]["id"].as_str().expect("student id").to_string();

    let fs = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "fees.create",
        json!({ "classId": class5 }),
    );
    let fs_id = fs["feeStructure"]["id"].as_str().expect("fee structure id").to_string();
    assert_eq!(fs["feeStructure"]["status"], "DRAFT");
    assert_eq!(fs["feeStructure"]["academicYear"], year.as_str());
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "fees.addComponent",
        json!({ "feeStructureId": fs_id, "name": "Tuition", "amount": 20000 }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "fees.addComponent",
        json!({ "feeStructureId": fs_id, "name": "Transport", "amount": 4000, "mandatory": false }),
    );
    let activated = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "fees.activate",
        json!({ "feeStructureId": fs_id }),
    );
    assert_eq!(activated["activation"]["ledgersCreated"], 1);
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "9",
            "fees.addComponent",
            json!({ "feeStructureId": fs_id, "name": "Exam", "amount": 500 }),
        ),
        "invalid_state"
    );

    let by_year = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "ledger.byStudentYear",
        json!({ "studentId": student_id }),
    );
    let ledger_id = by_year["ledger"]["id"].as_str().expect("ledger id").to_string();
    assert_eq!(by_year["summary"]["finalFee"], 24000.0);
    assert_eq!(by_year["summary"]["status"], "PENDING");

    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "ledger.adjustment.add",
        json!({
            "ledgerId": ledger_id,
            "type": "DISCOUNT",
            "amount": -2000,
            "reason": "sibling discount",
            "approvedBy": "principal",
        }),
    );
    let paid = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "ledger.payment.add",
        json!({
            "ledgerId": ledger_id,
            "amount": 8000,
            "mode": "UPI",
            "reference": "UTR-881",
            "collectedBy": "office",
        }),
    );
    assert_eq!(paid["receiptNumber"], format!("SKA/{}/000001", year));
    assert_eq!(paid["payment"]["studentId"], student_id.as_str());
    assert_eq!(paid["summary"]["pending"], 14000.0);
    assert_eq!(paid["summary"]["status"], "PARTIAL");

    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "13",
            "ledger.payment.add",
            json!({ "ledgerId": ledger_id, "amount": 0, "mode": "CASH", "collectedBy": "office" }),
        ),
        "invalid_amount"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "14",
            "ledger.payment.add",
            json!({ "ledgerId": "missing", "amount": 10, "mode": "CASH", "collectedBy": "office" }),
        ),
        "not_found"
    );
    assert_eq!(
        request_err(
            &mut stdin,
            &mut reader,
            "14a",
            "ledger.create",
            json!({
                "studentId": "missing",
                "classId": class5,
                "baseComponents": [{ "name": "Tuition", "amount": 100 }],
            }),
        ),
        "not_found"
    );
    for (id, method) in [("14b", "ledger.create"), ("14c", "ledger.upsert")] {
        assert_eq!(
            request_err(
                &mut stdin,
                &mut reader,
                id,
                method,
                json!({
                    "studentId": student_id,
                    "classId": class5,
                    "baseComponents": [{ "name": "Tuition", "amount": -100 }],
                }),
            ),
            "invalid_amount",
            "{} accepted a negative component",
            method
        );
    }

    request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "setup.update",
        json!({ "section": "school", "patch": { "receiptPrefix": "gva" } }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "ledger.payment.add",
        json!({ "ledgerId": ledger_id, "amount": 14000, "mode": "CASH", "collectedBy": "office" }),
    );
    assert_eq!(second["receiptNumber"], format!("GVA/{}/000002", year));
    assert_eq!(second["summary"]["status"], "PAID");

    let statement = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "ledger.statement",
        json!({ "ledgerId": ledger_id }),
    );
    assert_eq!(statement["adjustments"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(statement["payments"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(statement["payments"][0]["receiptNumber"], format!("GVA/{}/000001", year));

    let dues = request_ok(&mut stdin, &mut reader, "18", "reports.outstandingDues", json!({}));
    assert_eq!(dues["totalOutstanding"], 0.0);
    let income = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "reports.incomeExpense",
        json!({ "period": { "granularity": "YEARLY" } }),
    );
    assert_eq!(income["income"], 22000.0);
    assert_eq!(income["document"]["meta"]["academicYear"], year.as_str());
    let kpis = request_ok(&mut stdin, &mut reader, "19a", "reports.dashboard", json!({}));
    assert_eq!(kpis["totalIncome"], 22000.0);
    assert_eq!(kpis["totalPending"], 0.0);
    assert_eq!(kpis["studentsWithDues"], 0);
    assert!(kpis["latestMonth"].is_string());

    drop(stdin);
    let _ = child.wait();

    // State survives a restart.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let summary = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "ledger.summary",
        json!({ "ledgerId": ledger_id }),
    );
    assert_eq!(summary["paid"], 22000.0);
    assert_eq!(summary["pending"], 0.0);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
