//! 服务提供者
//!
//! 每个子系统通过一个 [`ServiceProvider`] 接入应用：
//! `register` 阶段只向容器写入绑定，`boot` 阶段可以解析任意绑定。
//! 状态迁移严格为 `Constructed -> Registered -> Booted`。

use async_trait::async_trait;

use crate::container::Container;
use crate::error::ProviderError;

/// 服务提供者 trait
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// 提供者名称（用于日志和错误信息）
    fn name(&self) -> &str;

    /// 注册阶段 - 向容器绑定依赖
    ///
    /// 只写入自己的绑定，不解析其他提供者的绑定
    fn register(&self, container: &mut Container) -> anyhow::Result<()>;

    /// 启动阶段 - 所有提供者都已注册后执行
    async fn boot(&self, _container: &Container) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 提供者所处的生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Constructed,
    Registered,
    Booted,
}

struct Slot {
    provider: Box<dyn ServiceProvider>,
    state: ProviderState,
}

/// 提供者注册表
///
/// 按添加顺序注册和启动
#[derive(Default)]
pub struct ProviderRegistry {
    slots: Vec<Slot>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加提供者
    pub fn add(&mut self, provider: Box<dyn ServiceProvider>) {
        tracing::debug!("Adding service provider: {}", provider.name());
        self.slots.push(Slot {
            provider,
            state: ProviderState::Constructed,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 所有提供者的名称和当前状态
    pub fn states(&self) -> Vec<(&str, ProviderState)> {
        self.slots
            .iter()
            .map(|slot| (slot.provider.name(), slot.state))
            .collect()
    }

    /// 执行注册阶段
    pub fn register_all(&mut self, container: &mut Container) -> Result<(), ProviderError> {
        for slot in &mut self.slots {
            transition(slot, ProviderState::Constructed, ProviderState::Registered)?;

            let name = slot.provider.name().to_string();
            tracing::info!("Registering provider: {}", name);
            slot.provider
                .register(container)
                .map_err(|e| ProviderError::RegisterFailed {
                    provider: name,
                    source: e.into(),
                })?;
            slot.state = ProviderState::Registered;
        }
        Ok(())
    }

    /// 执行启动阶段
    pub async fn boot_all(&mut self, container: &Container) -> Result<(), ProviderError> {
        for slot in &mut self.slots {
            transition(slot, ProviderState::Registered, ProviderState::Booted)?;

            let name = slot.provider.name().to_string();
            tracing::info!("Booting provider: {}", name);
            slot.provider
                .boot(container)
                .await
                .map_err(|e| ProviderError::BootFailed {
                    provider: name,
                    source: e.into(),
                })?;
            slot.state = ProviderState::Booted;
        }
        Ok(())
    }
}

fn transition(slot: &Slot, expected: ProviderState, to: ProviderState) -> Result<(), ProviderError> {
    if slot.state != expected {
        tracing::error!(
            "Provider '{}' is {:?}, cannot move to {:?}",
            slot.provider.name(),
            slot.state,
            to
        );
        return Err(ProviderError::InvalidTransition {
            provider: slot.provider.name().to_string(),
            from: slot.state,
            to,
        });
    }
    Ok(())
}
