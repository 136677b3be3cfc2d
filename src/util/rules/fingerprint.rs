use sha2::{Digest, Sha256};

use super::{RuleError, RuleSet};

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    format!("{:x}", digest)
}

/// 计算规则集的指纹（SHA256，对序列化结果进行哈希）
///
/// 写入抽取汇总，便于比对两次运行是否使用了同一套规则。
pub fn compute_rule_set_fingerprint(rules: &RuleSet) -> Result<String, RuleError> {
    let serialized = serde_json::to_vec(rules)?;
    Ok(hash_bytes(&serialized))
}

/// 页面缓存文件名：`<sha256(url)>.html`
pub fn cache_key_for_url(url: &str) -> String {
    format!("{}.html", hash_bytes(url.trim().as_bytes()))
}
