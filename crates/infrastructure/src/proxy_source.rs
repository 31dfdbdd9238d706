//! 代理来源
//!
//! 每行一个代理：`host:port`、`user:pass@host:port`，可带 `scheme://`；
//! 空行和 `#` 开头的行被忽略。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use claim_domain::{ProxyCandidate, ProxySource};
use claim_errors::{SchedulerError, SchedulerResult};
use tracing::warn;

/// 解析代理列表，返回成功解析的候选和无效行
pub fn parse_proxy_lines(content: &str) -> (Vec<ProxyCandidate>, Vec<String>) {
    let mut candidates = Vec::new();
    let mut invalid = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<ProxyCandidate>() {
            Ok(candidate) => {
                if !candidates.iter().any(|c: &ProxyCandidate| c.key() == candidate.key()) {
                    candidates.push(candidate);
                }
            }
            Err(e) => {
                warn!("忽略无效的代理行 {:?}: {}", line, e);
                invalid.push(line.to_string());
            }
        }
    }
    (candidates, invalid)
}

/// 固定候选列表
pub struct StaticProxySource {
    candidates: Vec<ProxyCandidate>,
}

impl StaticProxySource {
    pub fn new(candidates: Vec<ProxyCandidate>) -> Self {
        Self { candidates }
    }

    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let joined = lines
            .iter()
            .map(|l| l.as_ref())
            .collect::<Vec<_>>()
            .join("\n");
        let (candidates, _) = parse_proxy_lines(&joined);
        Self { candidates }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn fetch(&self, max: usize) -> SchedulerResult<Vec<ProxyCandidate>> {
        Ok(self.candidates.iter().take(max).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// 每次获取时重新读取代理列表文件，外部进程可随时追加
pub struct FileProxySource {
    path: PathBuf,
}

impl FileProxySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ProxySource for FileProxySource {
    async fn fetch(&self, max: usize) -> SchedulerResult<Vec<ProxyCandidate>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SchedulerError::ProxySource(format!("读取代理文件失败 {}: {e}", self.path.display()))
        })?;
        let (mut candidates, _) = parse_proxy_lines(&content);
        candidates.truncate(max);
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_lines() {
        let content = "\
# 住宅代理
10.0.0.1:8080
user:secret@10.0.0.2:3128

socks5://10.0.0.3:1080
10.0.0.1:8080
garbage
";
        let (candidates, invalid) = parse_proxy_lines(content);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[1].key(), "user@10.0.0.2:3128");
        assert_eq!(candidates[2].scheme, "socks5");
        assert_eq!(invalid, vec!["garbage".to_string()]);
    }

    #[tokio::test]
    async fn test_static_source_respects_max() {
        let source = StaticProxySource::from_lines(&["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"]);
        assert_eq!(source.fetch(2).await.unwrap().len(), 2);
        assert_eq!(source.fetch(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.txt");
        std::fs::write(&path, "10.0.0.1:80\n10.0.0.2:80\n").unwrap();

        let source = FileProxySource::new(&path);
        let candidates = source.fetch(5).await.unwrap();
        assert_eq!(candidates.len(), 2);

        let missing = FileProxySource::new(dir.path().join("missing.txt"));
        assert!(matches!(
            missing.fetch(5).await,
            Err(SchedulerError::ProxySource(_))
        ));
    }
}
