//! 类型化的服务容器
//!
//! 绑定以 `TypeId` 为键，解析时直接得到具体类型的 `Arc<T>`，
//! 不存在按字符串名称查找的路径。
//!
//! ```
//! use trees_core::Container;
//!
//! struct Greeting(&'static str);
//!
//! let mut container = Container::new();
//! container.singleton(Greeting("hello"));
//! assert_eq!(container.make::<Greeting>().unwrap().0, "hello");
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ContainerError, ContainerResult};
use crate::Scope;

type AnyArc = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> anyhow::Result<AnyArc> + Send + Sync>;

thread_local! {
    /// 当前线程正在解析的类型栈，用于循环依赖检测
    static RESOLVING: RefCell<Vec<(TypeId, &'static str)>> = const { RefCell::new(Vec::new()) };
}

enum Binding {
    /// 已经构建好的实例
    Instance(AnyArc),

    /// 延迟构建的单例，首次解析后缓存
    Lazy {
        factory: Factory,
        cached: Mutex<Option<AnyArc>>,
    },

    /// 每次解析都调用工厂
    Prototype(Factory),
}

struct Entry {
    type_name: &'static str,
    binding: Binding,
}

impl Entry {
    fn scope(&self) -> Scope {
        match self.binding {
            Binding::Prototype(_) => Scope::Prototype,
            _ => Scope::Singleton,
        }
    }
}

/// 应用容器
///
/// 注册阶段通过 `&mut self` 绑定，启动完成后只以 `&Container` 的形式共享，
/// 因此绑定在进程生命周期内不可变。
#[derive(Default)]
pub struct Container {
    bindings: HashMap<TypeId, Entry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定一个已经构建好的单例
    pub fn singleton<T: Any + Send + Sync>(&mut self, value: T) -> &mut Self {
        self.singleton_arc(Arc::new(value))
    }

    /// 绑定一个共享的单例（调用方保留 `Arc`）
    pub fn singleton_arc<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> &mut Self {
        self.insert::<T>(Binding::Instance(value))
    }

    /// 绑定一个延迟构建的单例，工厂只会成功执行一次
    pub fn lazy<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert::<T>(Binding::Lazy {
            factory: erase(factory),
            cached: Mutex::new(None),
        })
    }

    /// 绑定一个原型工厂，每次解析得到新实例
    pub fn factory<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert::<T>(Binding::Prototype(erase(factory)))
    }

    fn insert<T: Any>(&mut self, binding: Binding) -> &mut Self {
        let type_name = std::any::type_name::<T>();
        let previous = self.bindings.insert(
            TypeId::of::<T>(),
            Entry { type_name, binding },
        );

        if previous.is_some() {
            tracing::debug!("Binding for '{}' replaced", type_name);
        } else {
            tracing::trace!("Binding for '{}' registered", type_name);
        }
        self
    }

    /// 解析类型 `T`
    pub fn make<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let type_id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();

        let entry = self.bindings.get(&type_id).ok_or_else(|| {
            tracing::debug!("No binding for '{}'", type_name);
            ContainerError::UnresolvedBinding { type_name }
        })?;

        let value = match &entry.binding {
            Binding::Instance(value) => Arc::clone(value),
            Binding::Lazy { factory, cached } => {
                if let Some(value) = cached.lock().as_ref() {
                    return downcast::<T>(Arc::clone(value));
                }
                let value = self.build(type_id, type_name, factory)?;
                let mut slot = cached.lock();
                // 并发首次解析时以先写入者为准
                let value = slot.get_or_insert(value);
                Arc::clone(value)
            }
            Binding::Prototype(factory) => self.build(type_id, type_name, factory)?,
        };

        downcast::<T>(value)
    }

    fn build(
        &self,
        type_id: TypeId,
        type_name: &'static str,
        factory: &Factory,
    ) -> ContainerResult<AnyArc> {
        let cycle = RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, _)| *id == type_id) {
                let chain: Vec<&str> = stack.iter().map(|(_, name)| *name).collect();
                return Some(format!("{} -> {}", chain.join(" -> "), type_name));
            }
            stack.push((type_id, type_name));
            None
        });

        if let Some(chain) = cycle {
            tracing::error!("Circular dependency while resolving '{}': {}", type_name, chain);
            return Err(ContainerError::CircularDependency(chain));
        }

        struct ResolvingGuard;

        impl Drop for ResolvingGuard {
            fn drop(&mut self) {
                RESOLVING.with(|stack| {
                    stack.borrow_mut().pop();
                });
            }
        }

        let _guard = ResolvingGuard;

        factory(self).map_err(|e| match e.downcast::<ContainerError>() {
            Ok(ContainerError::CircularDependency(chain)) => {
                ContainerError::CircularDependency(chain)
            }
            Ok(other) => ContainerError::FactoryFailed {
                type_name,
                message: other.to_string(),
            },
            Err(e) => ContainerError::FactoryFailed {
                type_name,
                message: format!("{:#}", e),
            },
        })
    }

    /// 是否存在类型 `T` 的绑定
    pub fn bound<T: Any>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    /// 类型 `T` 的作用域
    pub fn scope_of<T: Any>(&self) -> Option<Scope> {
        self.bindings.get(&TypeId::of::<T>()).map(Entry::scope)
    }

    /// 所有绑定的类型名称（按字母排序，用于诊断日志）
    pub fn binding_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.bindings.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.binding_names())
            .finish()
    }
}

fn erase<T, F>(factory: F) -> Factory
where
    T: Any + Send + Sync,
    F: Fn(&Container) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |container| factory(container).map(|value| Arc::new(value) as AnyArc))
}

fn downcast<T: Any + Send + Sync>(value: AnyArc) -> ContainerResult<Arc<T>> {
    value.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Database {
        url: String,
    }

    #[derive(Debug)]
    struct Repository {
        db: Arc<Database>,
    }

    #[test]
    fn test_singleton_resolves_same_instance() {
        let mut container = Container::new();
        container.singleton(Database {
            url: "memory://".to_string(),
        });

        let a = container.make::<Database>().unwrap();
        let b = container.make::<Database>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.url, "memory://");
        assert_eq!(container.scope_of::<Database>(), Some(Scope::Singleton));
    }

    #[test]
    fn test_unbound_type_is_unresolved() {
        let container = Container::new();
        let err = container.make::<Database>().unwrap_err();
        match err {
            ContainerError::UnresolvedBinding { type_name } => {
                assert!(type_name.ends_with("Database"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lazy_factory_runs_once_and_resolves_dependencies() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut container = Container::new();
        container.singleton(Database {
            url: "memory://".to_string(),
        });
        container.lazy(|c| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Repository {
                db: c.make::<Database>()?,
            })
        });

        let a = container.make::<Repository>().unwrap();
        let b = container.make::<Repository>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.db.url, "memory://");
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prototype_yields_distinct_instances() {
        let mut container = Container::new();
        container.factory(|_| {
            Ok(Database {
                url: "fresh".to_string(),
            })
        });

        let a = container.make::<Database>().unwrap();
        let b = container.make::<Database>().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(container.scope_of::<Database>(), Some(Scope::Prototype));
    }

    #[test]
    fn test_missing_dependency_inside_factory_fails() {
        let mut container = Container::new();
        container.lazy(|c| {
            Ok(Repository {
                db: c.make::<Database>()?,
            })
        });

        let err = container.make::<Repository>().unwrap_err();
        assert!(matches!(err, ContainerError::FactoryFailed { .. }));
        assert!(err.to_string().contains("Unresolved binding"));
    }

    #[test]
    fn test_circular_dependency_detected() {
        #[derive(Debug)]
        struct A;
        struct B;

        let mut container = Container::new();
        container.lazy(|c| {
            c.make::<B>()?;
            Ok(A)
        });
        container.lazy(|c| {
            c.make::<A>()?;
            Ok(B)
        });

        let err = container.make::<A>().unwrap_err();
        assert!(matches!(err, ContainerError::CircularDependency(_)));
    }

    #[test]
    fn test_rebinding_replaces_previous() {
        let mut container = Container::new();
        container.singleton(Database {
            url: "first".to_string(),
        });
        container.singleton(Database {
            url: "second".to_string(),
        });

        assert_eq!(container.len(), 1);
        assert_eq!(container.make::<Database>().unwrap().url, "second");
    }
}
