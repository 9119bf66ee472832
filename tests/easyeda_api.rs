use std::time::Duration;

use lcsc_grabber::easyeda::{ApiOptions, ComponentSource, EasyedaApi, Part};
use lcsc_grabber::error::EasyedaError;
use lcsc_grabber::AppError;
use mockito::{Matcher, Server};
use serde_json::json;

fn api(server: &Server) -> EasyedaApi {
    EasyedaApi::with_options(ApiOptions {
        api_base: server.url(),
        models_base: server.url(),
        min_request_interval: Duration::ZERO,
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn component_body() -> String {
    let outline = json!({
        "gId": "g1",
        "nodeName": "g",
        "attrs": { "c_etype": "outline3D", "uuid": "abc123", "title": "LQFN-56" }
    });
    json!({
        "success": true,
        "result": {
            "title": "RP2040",
            "description": "Dual-core Cortex-M0+",
            "dataStr": {
                "head": {
                    "docType": "2",
                    "x": 400,
                    "y": "300",
                    "c_para": { "pre": "U?", "BOM_Manufacturer": "Raspberry Pi" }
                },
                "shape": [
                    "P~show~0~1~390~310~0~gge1~0^^390~310^^M 390 310 h 10~#880000^^1~403~314~0~IOVDD~start~~~#0000FF^^1~396~309~0~1~end~~~#0000FF^^0~393~310^^0~M 400 307 L 403 310 L 400 313"
                ]
            },
            "packageDetail": {
                "title": "LQFN-56_L7.0-W7.0-P0.4-EP",
                "dataStr": {
                    "head": { "x": 4000, "y": 3000 },
                    "shape": [
                        "PAD~RECT~4000~3000~4~4~1~~1~0~~0~gge1~0~~Y~0",
                        format!("SVGNODE~{}", outline)
                    ]
                }
            },
            "lcsc": { "url": "https://www.lcsc.com/datasheet/C2040.pdf" }
        }
    })
    .to_string()
}

#[tokio::test]
async fn parses_component_with_symbol_footprint_and_model() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/products/C2040/components")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(component_body())
        .create_async()
        .await;

    let component = api(&server).get_component_data("c2040").await.unwrap();
    mock.assert_async().await;

    assert_eq!(component.lcsc_id, "C2040");
    assert_eq!(component.title, "RP2040");
    assert_eq!(component.manufacturer, "Raspberry Pi");
    assert_eq!(component.datasheet, "https://www.lcsc.com/datasheet/C2040.pdf");
    let Part::Present(symbol) = &component.symbol else { panic!("symbol missing") };
    assert_eq!(symbol.origin_y, 300.0);
    assert_eq!(symbol.prefix.as_deref(), Some("U?"));
    let Part::Present(footprint) = &component.footprint else { panic!("footprint missing") };
    assert_eq!(footprint.title, "LQFN-56_L7.0-W7.0-P0.4-EP");
    let Part::Present(model) = &component.model_3d else { panic!("model missing") };
    assert_eq!(model.uuid, "abc123");
}

#[tokio::test]
async fn unknown_part_is_not_found() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/products/C999999999/components")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"success": false, "message": "not found", "result": null}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/api/products/C1/components")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let api = api(&server);
    let err = api.fetch("C999999999").await.unwrap_err();
    assert!(matches!(err, AppError::Easyeda(EasyedaError::NotFound(id)) if id == "C999999999"));
    let err = api.fetch("C1").await.unwrap_err();
    assert!(matches!(err, AppError::Easyeda(EasyedaError::NotFound(_))));
}

#[tokio::test]
async fn server_errors_are_network_failures() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/products/C2040/components")
        .match_query(Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let err = api(&server).fetch("C2040").await.unwrap_err();
    match err {
        AppError::Easyeda(e) => {
            assert!(e.is_network());
            assert!(matches!(e, EasyedaError::Status { status: 503, .. }));
        }
        other => panic!("expected a status error, got {:?}", other),
    }
}

#[tokio::test]
async fn invalid_json_is_invalid_data() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/products/C2040/components")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let err = api(&server).fetch("C2040").await.unwrap_err();
    assert!(matches!(err, AppError::Easyeda(EasyedaError::InvalidData(_))));
}

#[tokio::test]
async fn model_download_tolerates_missing_obj() {
    let mut server = Server::new_async().await;
    let step = server
        .mock("GET", "/qAxj6KHrDKw4blvCG8QJPs7Y/abc123")
        .with_status(200)
        .with_body("ISO-10303-21;\nEND-ISO-10303-21;\n")
        .create_async()
        .await;
    server
        .mock("GET", "/3dmodel/abc123")
        .with_status(404)
        .create_async()
        .await;

    let model = api(&server).fetch_model("abc123").await.unwrap();
    step.assert_async().await;
    assert!(model.step.unwrap().starts_with(b"ISO-10303-21"));
    assert!(model.obj.is_none());
}
