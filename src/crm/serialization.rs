use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use std::io::{Read, Write};

/// Base64 反序列化函数（支持 null 值）
pub fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use base64::Engine;
    // 先尝试反序列化为 Option<String>，以支持 null 值
    let opt_s: Option<String> = Deserialize::deserialize(deserializer)?;
    let s = match opt_s {
        Some(s) => s,
        None => return Ok(Vec::new()), // null 或缺失时返回空 Vec
    };
    if s.is_empty() {
        return Ok(Vec::new());
    }
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(serde::de::Error::custom)
}

/// 解压 gzip 数据
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// 压缩数据为 gzip 格式
pub fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// 生成乐观消息的临时 ID
///
/// 会话期内唯一且永不复用：uuid v4 加 "tmp_" 前缀，与服务器分配的 ID 空间隔离。
pub fn generate_temp_id() -> String {
    format!("tmp_{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let raw = br#"{"events":[{"type":"messageInsert"}]}"#;
        let compressed = compress_gzip(raw).unwrap();
        // gzip 魔数，客户端靠它嗅探是否压缩
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        let decompressed = decompress_gzip(&compressed).unwrap();
        assert_eq!(decompressed, raw);
    }

    #[test]
    fn temp_ids_are_unique() {
        let a = generate_temp_id();
        let b = generate_temp_id();
        assert!(a.starts_with("tmp_"));
        assert_ne!(a, b);
    }
}
