//! 世界选择策略

use std::collections::BTreeSet;

/// 世界选择模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldMode {
    /// 只转换宿主正常加载的世界
    Auto,
    /// 启动时加载并转换所有世界
    All,
    /// 只转换列出的世界
    Specific(BTreeSet<String>),
}

/// 决定哪些世界需要转换；进程生命周期内不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSelectionPolicy {
    mode: WorldMode,
}

impl WorldSelectionPolicy {
    pub fn new(mode: WorldMode) -> Self {
        Self { mode }
    }

    /// 解析配置中的 worlds 字段。
    ///
    /// 无法识别的值不会报错，而是作为逗号分隔的世界名列表处理。
    /// 每个名字去除首尾空白，空项被丢弃；名字本身区分大小写。
    pub fn parse(raw: &str) -> Self {
        let mode = match raw.trim().to_lowercase().as_str() {
            "auto" => WorldMode::Auto,
            "all" => WorldMode::All,
            _ => WorldMode::Specific(
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        };
        Self::new(mode)
    }

    pub fn mode(&self) -> &WorldMode {
        &self.mode
    }

    /// 加载事件中的世界是否需要转换
    pub fn is_eligible(&self, world_name: &str) -> bool {
        match &self.mode {
            WorldMode::Auto | WorldMode::All => true,
            WorldMode::Specific(names) => names.contains(world_name),
        }
    }

    /// 启动时需要主动加载的世界，保持磁盘列表的顺序
    pub fn worlds_to_preload(&self, on_disk: &[String]) -> Vec<String> {
        match &self.mode {
            WorldMode::Auto => Vec::new(),
            WorldMode::All => on_disk.to_vec(),
            WorldMode::Specific(names) => on_disk
                .iter()
                .filter(|world| names.contains(world.as_str()))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk() -> Vec<String> {
        ["arena", "lobby", "world"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_keywords() {
        assert_eq!(WorldSelectionPolicy::parse(" AUTO ").mode(), &WorldMode::Auto);
        assert_eq!(WorldSelectionPolicy::parse("all").mode(), &WorldMode::All);
    }

    #[test]
    fn unknown_value_becomes_specific_list() {
        let policy = WorldSelectionPolicy::parse("lobby, arena ,,");
        let expected: BTreeSet<String> = ["arena", "lobby"].iter().map(|s| s.to_string()).collect();
        assert_eq!(policy.mode(), &WorldMode::Specific(expected));
    }

    #[test]
    fn specific_filters_load_events() {
        let policy = WorldSelectionPolicy::parse("lobby");
        assert!(policy.is_eligible("lobby"));
        assert!(!policy.is_eligible("arena"));
        assert!(!policy.is_eligible("Lobby"));
    }

    #[test]
    fn auto_and_all_accept_every_load() {
        for raw in ["auto", "all"] {
            let policy = WorldSelectionPolicy::parse(raw);
            assert!(policy.is_eligible("lobby"));
            assert!(policy.is_eligible("arena"));
        }
    }

    #[test]
    fn preload_per_mode() {
        assert!(WorldSelectionPolicy::parse("auto").worlds_to_preload(&disk()).is_empty());
        assert_eq!(WorldSelectionPolicy::parse("all").worlds_to_preload(&disk()), disk());
        assert_eq!(
            WorldSelectionPolicy::parse("world,lobby,missing").worlds_to_preload(&disk()),
            vec!["lobby".to_string(), "world".to_string()]
        );
    }
}
