//! Status Reporter (§4.7), grounded on the original's `StatusInfo` class
//! (`examples/original_source/src/statusinfo.cpp`): a two-phase fetch
//! (faces, then RIB) correlated into a stable JSON document. Built with
//! `serde_json::json!` rather than the original's raw string concatenation
//! (see DESIGN.md).

use crate::fcc::{Fcc, FaceScope};
use ah_common::metrics::AgentMetrics;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Fetches the local forwarder's face and RIB datasets and renders the
/// `status` JSON document (§6 schema: `{"faces": [...], "metrics": {...}}`).
///
/// The RIB fetch only runs if the face fetch succeeded and returned at
/// least one face (§4.7).
pub async fn build_status(fcc: &Fcc, metrics: &AgentMetrics) -> Result<Value> {
    let faces = fcc.face_query(false).await.context("fetching face dataset for status")?;

    let routes_by_face: HashMap<u64, Vec<Value>> = if faces.is_empty() {
        HashMap::new()
    } else {
        let rib = fcc.rib_fetch().await.context("fetching RIB dataset for status")?;
        let mut by_face: HashMap<u64, Vec<Value>> = HashMap::new();
        for route in rib {
            let mut entry = json!({
                "name": route.name.to_string(),
                "origin": route.origin,
                "cost": route.cost,
                "flags": route.flags,
            });
            if let Some(exp) = route.expiration_period_ms {
                entry["expirationPeriod"] = json!(exp);
            }
            by_face.entry(route.face_id).or_default().push(entry);
        }
        by_face
    };

    let face_entries: Vec<Value> = faces
        .iter()
        .filter(|f| f.face_scope == FaceScope::NonLocal)
        .map(|f| {
            let mut entry = json!({
                "id": f.face_id,
                "remoteUri": f.remote_uri,
                "localUri": f.local_uri,
                "linkType": format!("{:?}", f.link_type),
                "faceScope": "NON_LOCAL",
                "facePersistency": f.face_persistency,
                "flags": f.flags,
                "inInterests": f.in_interests,
                "outInterests": f.out_interests,
                "inBytes": f.in_bytes,
                "outBytes": f.out_bytes,
                "inData": f.in_data,
                "outData": f.out_data,
                "inNacks": f.in_nacks,
                "outNacks": f.out_nacks,
                "routes": routes_by_face.get(&f.face_id).cloned().unwrap_or_default(),
            });
            if let Some(mtu) = f.mtu {
                entry["mtu"] = json!(mtu);
            }
            if let Some(exp) = f.expiration_period_ms {
                entry["expirationPeriod"] = json!(exp);
            }
            entry
        })
        .collect();

    Ok(json!({
        "faces": face_entries,
        "metrics": metrics.to_json(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcc::{FaceStatus, LinkType, RibEntry};
    use ah_common::name::Name;

    fn sample_faces() -> Vec<FaceStatus> {
        vec![FaceStatus {
            face_id: 5,
            remote_uri: "udp4://10.0.0.2:6363".into(),
            local_uri: "udp4://10.0.0.1:6363".into(),
            link_type: LinkType::PointToPoint,
            face_scope: FaceScope::NonLocal,
            face_persistency: 0,
            flags: 0,
            in_interests: 1,
            out_interests: 2,
            in_bytes: 10,
            out_bytes: 20,
            in_data: 1,
            out_data: 1,
            in_nacks: 0,
            out_nacks: 0,
            mtu: Some(1500),
            expiration_period_ms: None,
        }]
    }

    #[test]
    fn rendering_correlates_routes_by_face_id() {
        let faces = sample_faces();
        let rib = vec![RibEntry {
            name: Name::from_string("/node-b"),
            face_id: 5,
            origin: 0xFF,
            cost: 0,
            flags: 1,
            expiration_period_ms: Some(30_000),
        }];

        let mut routes_by_face: HashMap<u64, Vec<Value>> = HashMap::new();
        for route in rib {
            routes_by_face.entry(route.face_id).or_default().push(json!({
                "name": route.name.to_string(),
                "origin": route.origin,
                "cost": route.cost,
                "flags": route.flags,
            }));
        }

        let routes = routes_by_face.get(&faces[0].face_id).cloned().unwrap_or_default();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0]["name"], "/node-b");
    }
}
