use super::*;
use serde_json::json;

fn canonical(evidence: &Evidence) -> Value {
    serde_json::to_value(evidence).unwrap()
}

#[test]
fn test_doubled_quote_csv_artifact() {
    let raw = r#"{""site"":""hq"",""count"":2,""list_raw_events"":[{""id"":1}]}"#;
    let (evidence, recovery) = normalize_str_with_recovery(raw);

    assert_eq!(recovery, Recovery::Strategy("collapse_doubled_quotes"));
    assert_eq!(evidence.site, "hq");
    assert_eq!(evidence.count, 2);
    assert_eq!(evidence.list_raw_events, vec![json!({"id": 1})]);
    assert!(evidence.extra.is_empty());
}

#[test]
fn test_quoted_doubled_quote_artifact() {
    let raw = r#""{""site"":""hq"",""count"":2,""list_raw_events"":[]}""#;
    let (evidence, recovery) = normalize_str_with_recovery(raw);

    assert_eq!(recovery, Recovery::Strategy("strip_outer_quotes"));
    assert_eq!(evidence.site, "hq");
    assert_eq!(evidence.count, 2);
}

#[test]
fn test_strategy_three_only_payload() {
    let raw = r#""{\"site\":\"dc\",\"count\":1}""#;

    assert!(parse_direct(raw).is_err());
    assert!(parse_collapsed(raw).is_err());
    assert!(parse_unescaped(raw).is_ok());

    let (evidence, recovery) = normalize_str_with_recovery(raw);
    assert_eq!(recovery, Recovery::Strategy("strip_outer_quotes"));
    assert_eq!(evidence.site, "dc");
    assert_eq!(evidence.count, 1);
}

#[test]
fn test_api_export_fixups() {
    // the empty `site` value breaks blanket quote collapsing
    let raw = r##"{"site":"","value":[{""@odata.type"":""#microsoft.graph.user"",""id"":""u1""}]}"##;
    assert!(parse_direct(raw).is_err());
    assert!(parse_collapsed(raw).is_err());
    assert!(parse_unescaped(raw).is_err());

    let (evidence, recovery) = normalize_str_with_recovery(raw);
    assert_eq!(recovery, Recovery::Strategy("api_export_fixups"));
    assert_eq!(evidence.site, "");
    assert_eq!(evidence.extra["value"][0]["@odata.type"], json!("#microsoft.graph.user"));
    assert_eq!(evidence.extra["value"][0]["id"], json!("u1"));
}

#[test]
fn test_nested_json_string() {
    let inner = json!({"site": "edge", "count": 3}).to_string();
    let once = serde_json::to_string(&inner).unwrap();
    let twice = serde_json::to_string(&once).unwrap();

    let (evidence, recovery) = normalize_str_with_recovery(&twice);
    assert_eq!(recovery, Recovery::Strategy("unwrap_nested"));
    assert_eq!(evidence.site, "edge");
    assert_eq!(evidence.count, 3);
}

#[test]
fn test_escaped_control_characters() {
    let raw = r#"""{\n\t"site": "branch",\r\n\t"count": 4\n}"""#;
    let (evidence, recovery) = normalize_str_with_recovery(raw);
    assert_eq!(recovery, Recovery::Strategy("aggressive_cleanup"));
    assert_eq!(evidence.site, "branch");
    assert_eq!(evidence.count, 4);
}

#[test]
fn test_extraction_fallback() {
    let raw = r#"{"value":[{"userPrincipalName":"bob@x.com","displayName":"Bob" -- truncated"#;
    let (evidence, recovery) = normalize_str_with_recovery(raw);

    assert_eq!(recovery, Recovery::Extracted);
    assert_eq!(evidence.extra["userPrincipalNames"], json!(["bob@x.com"]));
    assert_eq!(evidence.extra["displayNames"], json!(["Bob"]));
    assert_eq!(evidence.extra["emails"], json!(["bob@x.com"]));
    assert!(evidence.list_raw_events.is_empty());
}

#[test]
fn test_extraction_counts_brace_objects() {
    let raw = r#"garbage {"fileName":"a.exe"} {"fileName":"b.dll"} {unterminated"#;
    let evidence = normalize_evidence_str(raw);
    assert_eq!(evidence.extra["fileNames"], json!(["a.exe", "b.dll"]));
    assert_eq!(evidence.count, 2);
}

#[test]
fn test_raw_snapshot_fallback() {
    let raw = "x".repeat(800);
    let (evidence, recovery) = normalize_str_with_recovery(&raw);

    assert_eq!(recovery, Recovery::Raw);
    assert_eq!(evidence.extra["raw"].as_str().unwrap().len(), RAW_SNAPSHOT_CHARS);
    assert_eq!(evidence.extra["parse_error"], json!(UNRECOVERABLE_MARKER));
    assert_eq!(evidence.count, 0);
    assert_eq!(evidence.site, "");
}

#[test]
fn test_total_on_garbage() {
    for raw in ["", "   ", "null", "42", "\"\"", "{{{{", "]]]", "\"just text\"", "é\u{0}\u{7f}"] {
        let value = canonical(&normalize_evidence_str(raw));
        assert!(value["site"].is_string(), "input: {:?}", raw);
        assert!(value["count"].is_u64(), "input: {:?}", raw);
        assert!(value["list_raw_events"].is_array(), "input: {:?}", raw);
    }
}

#[test]
fn test_object_merged_onto_defaults() {
    let evidence = normalize_evidence(&json!({"tenant": "t1", "count": "7"}));
    assert_eq!(evidence.site, "");
    assert_eq!(evidence.count, 7);
    assert!(evidence.list_raw_events.is_empty());
    assert_eq!(evidence.extra["tenant"], json!("t1"));
}

#[test]
fn test_array_folded_into_events() {
    let evidence = normalize_evidence(&json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    assert_eq!(evidence.count, 3);
    assert_eq!(evidence.list_raw_events.len(), 3);
}

#[test]
fn test_string_event_with_empty_value() {
    let evidence = normalize_evidence_str(r#"{"site":"hq","list_raw_events":"{\"user\":\"\",\"id\":7}"}"#);
    assert_eq!(evidence.list_raw_events, vec![json!({"user": "", "id": 7})]);
}

#[test]
fn test_count_coercion() {
    assert_eq!(normalize_evidence(&json!({"count": "abc"})).count, 0);
    assert_eq!(normalize_evidence(&json!({"count": -4})).count, 0);
    assert_eq!(normalize_evidence(&json!({"count": 2.9})).count, 2);
    assert_eq!(normalize_evidence(&json!({"count": null})).count, 0);
}

#[test]
fn test_camel_case_event_list_and_string_events() {
    let evidence = normalize_evidence(&json!({
        "site": "hq",
        "listRawEvents": "[{\"id\": 9}]"
    }));
    assert_eq!(evidence.list_raw_events, vec![json!({"id": 9})]);
    assert!(!evidence.extra.contains_key("listRawEvents"));
}

#[test]
fn test_idempotent_on_canonical_output() {
    let inputs = [
        json!(r#"{""site"":""hq"",""count"":2,""list_raw_events"":[{""id"":1}]}"#),
        json!(r#"userPrincipalName":"bob@x.com" ###"#),
        json!("complete garbage"),
        json!({"site": 5, "count": "3", "extra": {"k": [1, 2]}}),
    ];

    for input in inputs {
        let first = canonical(&normalize_evidence(&input));
        let second = canonical(&normalize_evidence(&first));
        assert_eq!(first, second);
    }
}
