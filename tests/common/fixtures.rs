//! Package fixtures and canned gateway answers

use base64::Engine;
use serde_json::{Value, json};
use std::io::{Cursor, Write};

/// Build a ZIP package holding one small XML document per name
pub fn package_with_documents(names: &[&str]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for name in names {
            writer.start_file(*name, options).unwrap();
            writer
                .write_all(br#"<?xml version="1.0"?><cfdi:Comprobante Version="4.0"/>"#)
                .unwrap();
        }
        writer.finish().unwrap();
    }
    buffer.into_inner()
}

/// Submission accepted with `request_id`
pub fn submit_accepted(request_id: &str) -> Value {
    json!({
        "statusCode": "5000",
        "message": "Solicitud Aceptada",
        "requestId": request_id,
    })
}

/// Verification answer with a state code and package list
pub fn verify_state(state_code: i32, package_ids: &[&str]) -> Value {
    json!({
        "statusCode": "5000",
        "message": "Solicitud Aceptada",
        "stateCode": state_code,
        "packageIds": package_ids,
    })
}

/// Download answer carrying `bytes`
pub fn download_payload(bytes: &[u8]) -> Value {
    json!({
        "statusCode": "5000",
        "message": "Solicitud Aceptada",
        "payloadBase64": base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}
