// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

mod common;

use approx::assert_relative_eq;
use rocket::http::{ContentType, Status};
use serde_json::{json, Value};

use common::{simulated_client, TRACE_POINTS};

#[rocket::async_test]
async fn test_snapshot_uses_the_default_module() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/detector/snapshot").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["module"], 4);
    assert_eq!(body["unit"], "dBm");
    assert_relative_eq!(body["wavelength_nm"].as_f64().unwrap(), 1310.0);
    for key in ["ch1_power", "ch2_power", "ch3_power", "ch4_power"] {
        assert!(body[key].is_f64(), "{} missing", key);
    }
}

#[rocket::async_test]
async fn test_module_and_channel_ranges() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/detector/snapshot?module=21").dispatch().await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body: Value = response.into_json().await.expect("JSON body");
    assert!(body["detail"].as_str().unwrap().contains("module"));

    let response = client
        .get("/detector/power?module=4&channel=7")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);

    let response = client
        .get("/detector/power?module=4&channel=2")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["channel"], 2);
    assert_eq!(body["unit"], "dBm");
}

#[rocket::async_test]
async fn test_config_update_is_validated_then_applied() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .post("/detector/config?module=4&channel=1")
        .header(ContentType::JSON)
        .body(json!({ "power_unit": "furlong", "resolution_pm": 5.0 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);

    // Nothing was written by the rejected request
    let response = client.get("/detector/config?module=4&channel=1").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["power_unit"], "dBm");
    assert_relative_eq!(body["resolution_pm"].as_f64().unwrap(), 0.1);

    let response = client
        .post("/detector/config?module=4&channel=1")
        .header(ContentType::JSON)
        .body(json!({ "wavelength_nm": 1550.0, "resolution_pm": 5.0 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["success"], true);
    assert_relative_eq!(body["applied"]["wavelength_nm"].as_f64().unwrap(), 1550.0);

    let response = client.get("/detector/config?module=4&channel=1").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["wavelength_nm"].as_f64().unwrap(), 1550.0);
    assert_relative_eq!(body["resolution_pm"].as_f64().unwrap(), 5.0);
}

#[rocket::async_test]
async fn test_stabilization_duration_limit() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .post("/detector/stabilization")
        .header(ContentType::JSON)
        .body(json!({ "output": true, "duration_seconds": 61.0 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["detail"], "Duration must be 0-60 seconds");

    let response = client
        .post("/detector/stabilization")
        .header(ContentType::JSON)
        .body(json!({ "output": false, "duration_seconds": 2.5 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/detector/stabilization").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["output"], false);
    assert_relative_eq!(body["duration_seconds"].as_f64().unwrap(), 2.5);
}

#[rocket::async_test]
async fn test_reference_trace_after_create_reference() {
    let (client, _session) = simulated_client(true).await;

    let response = client.post("/detector/reference?module=4&channel=1").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .get("/detector/trace/metadata?module=4&channel=1&trace_type=12")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["num_points"], TRACE_POINTS);
    assert_eq!(body["trace_type"], 12);
}

#[rocket::async_test]
async fn test_trace_data_in_nanometres() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .get("/detector/trace/data?module=4&channel=1&trace_type=1")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    let wavelengths = body["wavelengths_nm"].as_array().unwrap();
    let values = body["values"].as_array().unwrap();
    assert_eq!(wavelengths.len(), TRACE_POINTS);
    assert_eq!(values.len(), TRACE_POINTS);
    assert_relative_eq!(wavelengths[0].as_f64().unwrap(), 1262.5, epsilon = 1e-6);
    assert_relative_eq!(
        wavelengths[TRACE_POINTS - 1].as_f64().unwrap(),
        1355.0,
        epsilon = 1e-6
    );
    assert_eq!(body["metadata"]["num_points"], TRACE_POINTS);

    let response = client
        .get("/detector/trace/data?trace_type=24")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
}

#[rocket::async_test]
async fn test_trace_binary_is_an_npy_file() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .get("/detector/trace/binary?module=4&channel=1&trace_type=11")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::Binary));
    assert_eq!(
        response.headers().get_one("Content-Disposition"),
        Some("attachment; filename=trace_m4_c1_t11.npy")
    );

    let bytes = response.into_bytes().await.expect("body");
    assert_eq!(&bytes[..6], b"\x93NUMPY");
    let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
    let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
    assert!(header.contains("('wavelengths', '<f8')"));
    assert!(header.contains("('values', '<f8')"));
    assert!(header.contains(&format!("'shape': ({},)", TRACE_POINTS)));
    assert_eq!(bytes.len(), 10 + header_len + TRACE_POINTS * 16);
}
