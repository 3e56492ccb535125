// gltf.rs - glTF 2.0 writer (JSON with data URI, or binary GLB)
//
// One mesh, one primitive: POSITION, NORMAL, COLOR_0 (when the mesh is
// colored) and u32 indices, all packed into a single buffer. Every view is
// 4-byte aligned because every component is 4 bytes wide. Lighting and
// scores ride along in `scenes[0].extras`.

use serde_json::{Value, json};

use crate::error::{ExportError, ExportResult};
use crate::pipeline::SceneResult;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;

struct Packed {
    bytes: Vec<u8>,
    views: Vec<Value>,
    accessors: Vec<Value>,
    attributes: serde_json::Map<String, Value>,
    indices: usize,
}

fn push_view(p: &mut Packed, start: usize, target: u32) -> usize {
    p.views.push(json!({
        "buffer": 0,
        "byteOffset": start,
        "byteLength": p.bytes.len() - start,
        "target": target,
    }));
    p.views.len() - 1
}

fn pack(scene: &SceneResult) -> ExportResult<Packed> {
    let mesh = &scene.mesh;
    let bounds = mesh.bounds().ok_or_else(|| ExportError::InvalidMesh("no vertices".into()))?;
    if mesh.face_count() == 0 {
        return Err(ExportError::InvalidMesh("no faces".into()));
    }
    let n = mesh.vertex_count();
    let mut p = Packed {
        bytes: Vec::new(),
        views: Vec::new(),
        accessors: Vec::new(),
        attributes: serde_json::Map::new(),
        indices: 0,
    };

    let start = p.bytes.len();
    for v in mesh.vertices() {
        for c in [v.x, v.y, v.z] {
            p.bytes.extend_from_slice(&(c as f32).to_le_bytes());
        }
    }
    let view = push_view(&mut p, start, ARRAY_BUFFER);
    p.accessors.push(json!({
        "bufferView": view,
        "componentType": FLOAT,
        "count": n,
        "type": "VEC3",
        "min": [bounds.min.x as f32, bounds.min.y as f32, bounds.min.z as f32],
        "max": [bounds.max.x as f32, bounds.max.y as f32, bounds.max.z as f32],
    }));
    p.attributes.insert("POSITION".into(), json!(p.accessors.len() - 1));

    let start = p.bytes.len();
    for nrm in mesh.vertex_normals() {
        for c in [nrm.x, nrm.y, nrm.z] {
            p.bytes.extend_from_slice(&(c as f32).to_le_bytes());
        }
    }
    let view = push_view(&mut p, start, ARRAY_BUFFER);
    p.accessors.push(json!({ "bufferView": view, "componentType": FLOAT, "count": n, "type": "VEC3" }));
    p.attributes.insert("NORMAL".into(), json!(p.accessors.len() - 1));

    if let Some(colors) = mesh.colors() {
        let start = p.bytes.len();
        for rgb in colors {
            for c in rgb {
                p.bytes.extend_from_slice(&(f32::from(*c) / 255.0).to_le_bytes());
            }
        }
        let view = push_view(&mut p, start, ARRAY_BUFFER);
        p.accessors.push(json!({ "bufferView": view, "componentType": FLOAT, "count": n, "type": "VEC3" }));
        p.attributes.insert("COLOR_0".into(), json!(p.accessors.len() - 1));
    }

    let start = p.bytes.len();
    for f in mesh.faces() {
        for i in f {
            p.bytes.extend_from_slice(&i.to_le_bytes());
        }
    }
    let view = push_view(&mut p, start, ELEMENT_ARRAY_BUFFER);
    p.accessors.push(json!({
        "bufferView": view,
        "componentType": UNSIGNED_INT,
        "count": mesh.face_count() * 3,
        "type": "SCALAR",
    }));
    p.indices = p.accessors.len() - 1;
    Ok(p)
}

fn document(scene: &SceneResult, p: &Packed, uri: Option<String>) -> Value {
    let mut buffer = json!({ "byteLength": p.bytes.len() });
    if let Some(uri) = uri {
        buffer["uri"] = json!(uri);
    }
    json!({
        "asset": { "version": "2.0", "generator": concat!("memory-reconstructor ", env!("CARGO_PKG_VERSION")) },
        "scene": 0,
        "scenes": [{
            "nodes": [0],
            "extras": {
                "lighting": scene.lighting,
                "complexity": scene.complexity,
                "quality": scene.quality,
            },
        }],
        "nodes": [{ "mesh": 0, "name": "memory" }],
        "meshes": [{
            "primitives": [{
                "attributes": p.attributes,
                "indices": p.indices,
                "material": 0,
                "mode": 4,
            }],
        }],
        "materials": [{
            "pbrMetallicRoughness": { "metallicFactor": 0.0, "roughnessFactor": 1.0 },
            "doubleSided": true,
        }],
        "accessors": p.accessors,
        "bufferViews": p.views,
        "buffers": [buffer],
    })
}

/// Text glTF with the buffer embedded as a base64 data URI.
pub fn to_gltf(scene: &SceneResult) -> ExportResult<String> {
    let p = pack(scene)?;
    let uri = format!("data:application/octet-stream;base64,{}", base64_encode(&p.bytes));
    Ok(serde_json::to_string_pretty(&document(scene, &p, Some(uri)))?)
}

/// Binary GLB: 12-byte header, space-padded JSON chunk, zero-padded BIN chunk.
pub fn to_glb(scene: &SceneResult) -> ExportResult<Vec<u8>> {
    let p = pack(scene)?;
    let mut json = serde_json::to_vec(&document(scene, &p, None))?;
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = p.bytes;
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let total = u32::try_from(total).map_err(|_| ExportError::InvalidMesh(format!("{total} bytes exceeds GLB limit")))?;
    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    for (kind, chunk) in [(CHUNK_JSON, &json), (CHUNK_BIN, &bin)] {
        out.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

fn base64_encode(input: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b0 = u32::from(chunk[0]);
        let b1 = u32::from(chunk.get(1).copied().unwrap_or(0));
        let b2 = u32::from(chunk.get(2).copied().unwrap_or(0));
        let n = (b0 << 16) | (b1 << 8) | b2;
        out.push(CHARS[(n >> 18) as usize & 0x3F] as char);
        out.push(CHARS[(n >> 12) as usize & 0x3F] as char);
        out.push(if chunk.len() > 1 { CHARS[(n >> 6) as usize & 0x3F] as char } else { '=' });
        out.push(if chunk.len() > 2 { CHARS[n as usize & 0x3F] as char } else { '=' });
    }
    out
}
