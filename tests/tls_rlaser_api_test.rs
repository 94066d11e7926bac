// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ctp10-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

mod common;

use approx::assert_relative_eq;
use rocket::http::{ContentType, Status};
use serde_json::{json, Value};

use common::simulated_client;

#[rocket::async_test]
async fn test_tls_defaults_to_the_o_band_laser() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/tls/1/config").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["channel"], 1);
    assert_eq!(body["identifier"], 2);
    assert_eq!(body["trigin"], 2);
    assert_relative_eq!(body["start_wavelength_nm"].as_f64().unwrap(), 1262.5);
    assert_relative_eq!(body["stop_wavelength_nm"].as_f64().unwrap(), 1355.0);

    let response = client.get("/tls/5/config").dispatch().await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
}

#[rocket::async_test]
async fn test_tls_partial_update_echoes_provided_fields() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .post("/tls/2/config")
        .header(ContentType::JSON)
        .body(json!({ "laser_power_dbm": 3.0, "sweep_speed_nmps": 50.0 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(
        body["updated"],
        json!({ "sweep_speed_nmps": 50.0, "laser_power_dbm": 3.0 })
    );

    let response = client.get("/tls/2/config").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["laser_power_dbm"].as_f64().unwrap(), 3.0);
    assert_relative_eq!(body["sweep_speed_nmps"].as_f64().unwrap(), 50.0);
    // Untouched
    assert_relative_eq!(body["start_wavelength_nm"].as_f64().unwrap(), 1262.5);
}

#[rocket::async_test]
async fn test_tls_identifier_is_applied_before_other_fields() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .post("/tls/1/config")
        .header(ContentType::JSON)
        .body(json!({ "identifier": 1, "laser_power_dbm": 2.0 }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client.get("/tls/1/config").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["identifier"], 1);
    assert_relative_eq!(body["start_wavelength_nm"].as_f64().unwrap(), 1502.0);
    assert_relative_eq!(body["laser_power_dbm"].as_f64().unwrap(), 2.0);
}

#[rocket::async_test]
async fn test_tls_config_ranges() {
    let (client, _session) = simulated_client(true).await;

    for body in [
        json!({ "start_wavelength_nm": 1250.0 }),
        json!({ "sweep_speed_nmps": 1.0 }),
        json!({ "laser_power_dbm": 11.0 }),
        json!({ "trigin": 9 }),
        json!({ "identifier": 0 }),
        json!({ "start_wavelength_nm": 1400.0, "stop_wavelength_nm": 1300.0 }),
    ] {
        let response = client
            .post("/tls/1/config")
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity, "{}", body);
    }
}

#[rocket::async_test]
async fn test_tls_scalar_endpoints() {
    let (client, _session) = simulated_client(true).await;

    let response = client
        .post("/tls/3/wavelength?start_nm=1270&stop_nm=1340")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let response = client.get("/tls/3/wavelength").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["start_nm"].as_f64().unwrap(), 1270.0);
    assert_relative_eq!(body["stop_nm"].as_f64().unwrap(), 1340.0);

    let response = client.post("/tls/3/power?power_dbm=-4.5").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let response = client.get("/tls/3/power").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["power_dbm"].as_f64().unwrap(), -4.5);

    let response = client.post("/tls/3/speed?speed_nmps=250").dispatch().await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let response = client.post("/tls/3/speed?speed_nmps=100").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let response = client.get("/tls/3/speed").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["speed_nmps"].as_f64().unwrap(), 100.0);
}

#[rocket::async_test]
async fn test_tls_trigger() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/tls/1/trigger").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["trigin"], 2);
    assert_eq!(body["description"], "TRIG IN port 2");

    let response = client.post("/tls/1/trigger?trigin=9").dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["detail"], "Trigger must be 0-8");

    let response = client.post("/tls/1/trigger?trigin=0").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["description"], "Software trigger");
}

#[rocket::async_test]
async fn test_rlaser_identification() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/rlaser/2/id").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["laser_number"], 2);
    assert_eq!(body["manufacturer"], "EXFO");
    assert_eq!(body["model"], "T200S-O-M");
    assert_eq!(body["serial"], "EO241510155");
    assert_eq!(body["firmware"], "4.6.3.0");

    let response = client.get("/rlaser/11/id").dispatch().await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
}

#[rocket::async_test]
async fn test_rlaser_on_off_and_config() {
    let (client, _session) = simulated_client(true).await;

    let response = client.get("/rlaser/1/state").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["is_on"], false);
    assert_eq!(body["state"], "OFF");

    let response = client.post("/rlaser/1/on").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let response = client.get("/rlaser/1/state").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["is_on"], true);
    assert_eq!(body["state"], "ON");

    let response = client
        .post("/rlaser/1/config")
        .header(ContentType::JSON)
        .body(json!({ "power_dbm": 6.0, "power_state": false }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["config"], json!({ "power_dbm": 6.0, "power_state": false }));

    let response = client.get("/rlaser/1/config").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_eq!(body["id"], "EXFO,T100S-HP,0,6.07");
    assert_relative_eq!(body["power_dbm"].as_f64().unwrap(), 6.0);
    assert_relative_eq!(body["wavelength_nm"].as_f64().unwrap(), 1550.0);
    assert_eq!(body["is_on"], false);

    let response = client
        .post("/rlaser/1/wavelength?wavelength_nm=1551.5")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let response = client.get("/rlaser/1/wavelength").dispatch().await;
    let body: Value = response.into_json().await.expect("JSON body");
    assert_relative_eq!(body["wavelength_nm"].as_f64().unwrap(), 1551.5);
}
