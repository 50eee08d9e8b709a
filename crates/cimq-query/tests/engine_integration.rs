use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use cimq_query::*;
use cimq_types::decode_from_text;

const PROCESSES: &str = "select Name, ProcessId from Win32_Process";

fn cimv2() -> Namespace {
    Namespace::new(r"root\cimv2").unwrap()
}

fn process(name: &str, pid: u32) -> NativeObject {
    NativeObject::new("Win32_Process")
        .with("Name", NativeValue::String(name.to_string()))
        .with("ProcessId", NativeValue::UI4(pid))
}

fn fixture_backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_rows(
            r"root\cimv2",
            PROCESSES,
            vec![process("System Idle Process", 0), process("System", 4)],
        )
        .with_rows(
            r"root\cimv2",
            "SELECT * FROM Win32_OperatingSystem",
            vec![
                NativeObject::new("Win32_OperatingSystem")
                    .with("Caption", NativeValue::String("Microsoft Windows 11 Pro".to_string()))
                    .with(
                        "LastBootUpTime",
                        NativeValue::DateTime("20240115093005.250000+060".to_string()),
                    )
                    .with(
                        "MUILanguages",
                        NativeValue::Array(vec![NativeValue::String("en-US".to_string())]),
                    )
                    .with(
                        "Locale",
                        NativeValue::Object(
                            NativeObject::new("Win32_Locale")
                                .with("Code", NativeValue::String("0409".to_string()))
                                .with("Primary", NativeValue::Bool(true)),
                        ),
                    )
                    .with("FreePhysicalMemory", NativeValue::UI8(8_388_608))
                    .with("LoadFactor", NativeValue::R8(0.25)),
            ],
        )
        .with_rows(
            r"root\cimv2",
            "SELECT * FROM Win32_Service",
            vec![
                NativeObject::new("Win32_Service")
                    .with("Name", NativeValue::String("Spooler".to_string()))
                    .with("StartName", NativeValue::String("LocalSystem".to_string())),
                NativeObject::new("Win32_Service")
                    .with("Name", NativeValue::String("WinDefend".to_string()))
                    .with("Description", NativeValue::Null),
            ],
        )
        .with_rows(
            r"root\cimv2",
            "SELECT * FROM Win32_PnPEntity",
            vec![NativeObject::new("Win32_PnPEntity").with(
                "Handle",
                NativeValue::Unsupported {
                    type_name: "VT_UNKNOWN".to_string(),
                },
            )],
        )
}

fn engine(backend: MemoryBackend, config: EngineConfig) -> (Engine, Arc<MemoryBackend>) {
    let backend = Arc::new(backend);
    let engine = Engine::new(backend.clone(), config).unwrap();
    (engine, backend)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_process_listing_scenario() {
    let (engine, _) = engine(fixture_backend(), EngineConfig::default());
    let connection = engine.open_connection(cimv2()).unwrap();

    let text = connection.query(PROCESSES).unwrap();
    let result = decode_from_text(&text).unwrap();

    assert_eq!(result.len(), 2);
    for record in &result {
        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, ["Name", "ProcessId"]);
        assert!(record.get("Name").and_then(Value::as_str).is_some());
        assert!(record.get("ProcessId").and_then(Value::as_i64).is_some());
    }
    connection.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_nested_values_round_trip_through_text() {
    let (engine, _) = engine(fixture_backend(), EngineConfig::default());
    let connection = engine.open_connection(cimv2()).unwrap();

    let text = connection.query("SELECT * FROM Win32_OperatingSystem").unwrap();
    let structured = connection
        .query_structured("SELECT * FROM Win32_OperatingSystem")
        .unwrap();
    let decoded = decode_from_text(&text).unwrap();
    assert_eq!(decoded, structured);

    let os = &decoded.records()[0];
    assert_eq!(
        os.get("LastBootUpTime"),
        Some(&Value::DateTime(
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 5).unwrap()
                + chrono::Duration::microseconds(250_000)
        ))
    );
    assert_eq!(
        os.get("Locale")
            .and_then(Value::as_record)
            .and_then(|locale| locale.get("Primary")),
        Some(&Value::Bool(true))
    );
    assert_eq!(os.get("FreePhysicalMemory").and_then(Value::as_i64), Some(8_388_608));
    assert_eq!(os.get("LoadFactor"), Some(&Value::Float(0.25)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_finite_floats_survive_text_form() {
    let backend = MemoryBackend::new().with_rows(
        r"root\cimv2",
        "SELECT * FROM Win32_PerfFormattedData_Counters",
        vec![
            NativeObject::new("Win32_PerfFormattedData_Counters")
                .with("Rate", NativeValue::R8(f64::INFINITY))
                .with("Drift", NativeValue::R4(f32::NEG_INFINITY)),
        ],
    );
    let (engine, _) = engine(backend, EngineConfig::default());
    let connection = engine.open_connection(cimv2()).unwrap();

    let text = connection.query("SELECT * FROM Win32_PerfFormattedData_Counters").unwrap();
    let structured = connection
        .query_structured("SELECT * FROM Win32_PerfFormattedData_Counters")
        .unwrap();

    assert_eq!(decode_from_text(&text).unwrap(), structured);
    assert_eq!(structured.records()[0].get("Rate"), Some(&Value::Float(f64::INFINITY)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_closed_connection_lifecycle() {
    let (engine, backend) = engine(fixture_backend(), EngineConfig::default());
    let connection = engine.open_connection(cimv2()).unwrap();

    assert!(connection.query(PROCESSES).is_ok());
    connection.close();
    connection.close();

    let err = connection.query_structured(PROCESSES).unwrap_err();
    assert!(matches!(err, EngineError::ClosedConnection { .. }));
    assert!(err.is_recoverable());

    assert_eq!(backend.context_inits(), 1);
    assert_eq!(backend.context_teardowns(), 1);
    assert_eq!(backend.open_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_dispatches_are_isolated() {
    let mut backend = MemoryBackend::new().with_namespace(r"root\cimv2");
    for i in 0..8u32 {
        backend = backend
            .with_rows(
                r"root\cimv2",
                &format!("SELECT * FROM Win32_Process WHERE ProcessId = {i}"),
                vec![process(&format!("proc-{i}"), i)],
            )
            .with_delay(
                r"root\cimv2",
                &format!("SELECT * FROM Win32_Process WHERE ProcessId = {i}"),
                Duration::from_millis(u64::from(8 - i) * 5),
            );
    }
    let (engine, backend) = engine(backend, EngineConfig::default());

    let handles: Vec<_> = (0..8u32)
        .map(|i| {
            engine.dispatch_query(
                cimv2(),
                &format!("SELECT * FROM Win32_Process WHERE ProcessId = {i}"),
            )
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert_eq!(result.len(), 1);
        let expected = format!("proc-{i}");
        assert_eq!(
            result.records()[0].get("Name").and_then(Value::as_str),
            Some(expected.as_str())
        );
    }

    assert_eq!(backend.context_inits(), 8);
    assert_eq!(backend.context_teardowns(), 8);
    assert_eq!(backend.open_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mixed_namespace_dispatches_under_cap_are_isolated() {
    let mut backend = MemoryBackend::new();
    for i in 0..6u64 {
        let (namespace, class) = if i % 2 == 0 {
            (r"root\cimv2", "Win32_Process")
        } else {
            (r"root\wmi", "MSAcpi_ThermalZoneTemperature")
        };
        let query = format!("SELECT * FROM {class} WHERE Id = {i}");
        backend = backend
            .with_rows(
                namespace,
                &query,
                vec![NativeObject::new(class)
                    .with("Id", NativeValue::UI8(i))
                    .with("Namespace", NativeValue::String(namespace.to_string()))],
            )
            .with_delay(namespace, &query, Duration::from_millis((6 - i) * 10));
    }
    let (engine, backend) = engine(backend, EngineConfig::default().with_max_concurrent_queries(3));

    let handles: Vec<_> = (0..6u64)
        .map(|i| {
            let (namespace, class) = if i % 2 == 0 {
                (r"root\cimv2", "Win32_Process")
            } else {
                (r"root\wmi", "MSAcpi_ThermalZoneTemperature")
            };
            (
                i,
                namespace,
                engine.dispatch_query(
                    Namespace::new(namespace).unwrap(),
                    &format!("SELECT * FROM {class} WHERE Id = {i}"),
                ),
            )
        })
        .collect();

    for (i, namespace, handle) in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.len(), 1);
        let record = &result.records()[0];
        assert_eq!(record.get("Id").and_then(Value::as_i64), i64::try_from(i).ok());
        assert_eq!(record.get("Namespace").and_then(Value::as_str), Some(namespace));
    }

    assert!(backend.peak_sessions() <= 3);
    assert_eq!(backend.context_inits(), 6);
    assert_eq!(backend.context_teardowns(), 6);
    assert_eq!(backend.open_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_fields_are_null() {
    let (engine, _) = engine(fixture_backend(), EngineConfig::default());

    let result = engine
        .dispatch_query(cimv2(), "SELECT * FROM Win32_Service")
        .await
        .unwrap();

    for record in &result {
        let names: Vec<_> = record.field_names().collect();
        assert_eq!(names, ["Name", "StartName", "Description"]);
    }
    assert!(result.records()[0].get("Description").is_some_and(Value::is_null));
    assert!(result.records()[1].get("StartName").is_some_and(Value::is_null));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsupported_type_fails_whole_query() {
    let (engine, _) = engine(fixture_backend(), EngineConfig::default());
    let connection = engine.open_connection(cimv2()).unwrap();

    let err = connection.query("SELECT * FROM Win32_PnPEntity").unwrap_err();
    assert_eq!(
        err,
        EngineError::UnsupportedType {
            field: "Handle".to_string(),
            native_type: "VT_UNKNOWN".to_string(),
        }
    );

    let err = engine
        .dispatch_query(cimv2(), "SELECT * FROM Win32_PnPEntity")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedType { ref field, .. } if field == "Handle"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_context_is_torn_down() {
    let (engine, backend) = engine(fixture_backend(), EngineConfig::default());

    let first = engine.open_connection(cimv2()).unwrap();
    let second = engine.open_connection(cimv2()).unwrap();
    let _ = engine.open_connection(Namespace::new(r"root\nowhere").unwrap());
    let _ = engine.dispatch_query(cimv2(), PROCESSES).await;
    let _ = engine.dispatch_query(cimv2(), "SELECT * FROM Nope").await;

    assert_eq!(backend.open_sessions(), 2);
    drop(first);
    second.close();

    assert_eq!(backend.context_inits(), 5);
    assert_eq!(backend.context_teardowns(), 5);
    assert_eq!(backend.open_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispatch_respects_concurrency_cap() {
    let (engine, backend) = engine(
        fixture_backend().with_delay(r"root\cimv2", PROCESSES, Duration::from_millis(30)),
        EngineConfig::default().with_max_concurrent_queries(2),
    );

    let handles: Vec<_> = (0..6)
        .map(|_| engine.dispatch_query(cimv2(), PROCESSES))
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().len(), 2);
    }

    assert!(backend.peak_sessions() <= 2);
    assert_eq!(backend.queries_executed(), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_context_failure_is_reported() {
    let (engine, backend) = engine(
        fixture_backend().with_context_failure("CoInitializeEx failed: 0x80010106"),
        EngineConfig::default(),
    );

    let err = engine.open_connection(cimv2()).unwrap_err();
    assert_eq!(
        err,
        EngineError::ContextInitialization("CoInitializeEx failed: 0x80010106".to_string())
    );

    let err = engine.dispatch_query(cimv2(), PROCESSES).await.unwrap_err();
    assert!(matches!(err, EngineError::ContextInitialization(_)));
    assert_eq!(backend.context_teardowns(), 0);
}
