//! In-memory snapshot of the watched resources.
//!
//! Every kind lives on its own shelf: a `RwLock` over a `BTreeMap` keyed by
//! namespaced name, so listings come out sorted and writers of one kind never
//! block readers of another. Reads hand out copies; nothing derived is cached,
//! relationship queries are recomputed on every call.

use crate::config::RELATED_GATEWAY_ANNOTATION;
use crate::error::ControllerError;
use crds::{Gateway, GatewayClass, GatewayConfig, ParentReference, UDPRoute};
use k8s_openapi::api::core::v1::Service;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// The closed set of kinds held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    /// gateway.networking.k8s.io GatewayClass
    GatewayClass,
    /// stunner.l7mp.io GatewayConfig
    GatewayConfig,
    /// gateway.networking.k8s.io Gateway
    Gateway,
    /// gateway.networking.k8s.io UDPRoute
    UdpRoute,
    /// core/v1 Service
    Service,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GatewayClass => "GatewayClass",
            Self::GatewayConfig => "GatewayConfig",
            Self::Gateway => "Gateway",
            Self::UdpRoute => "UDPRoute",
            Self::Service => "Service",
        };
        f.write_str(s)
    }
}

/// Namespaced name of an object; `namespace` is `None` for cluster-scoped kinds
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    /// Namespace
    pub namespace: Option<String>,
    /// Name
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of any kube resource, `None` if it has no name
    pub fn of<K: Resource>(obj: &K) -> Option<Self> {
        let meta = obj.meta();
        Some(Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone()?,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A stored object tagged with its kind
#[derive(Debug, Clone)]
pub enum Object {
    /// A GatewayClass
    GatewayClass(GatewayClass),
    /// A GatewayConfig
    GatewayConfig(GatewayConfig),
    /// A Gateway
    Gateway(Gateway),
    /// A UDPRoute
    UdpRoute(UDPRoute),
    /// A Service
    Service(Service),
}

impl Object {
    /// Kind of the wrapped object
    pub fn kind(&self) -> Kind {
        match self {
            Self::GatewayClass(_) => Kind::GatewayClass,
            Self::GatewayConfig(_) => Kind::GatewayConfig,
            Self::Gateway(_) => Kind::Gateway,
            Self::UdpRoute(_) => Kind::UdpRoute,
            Self::Service(_) => Kind::Service,
        }
    }
}

/// Capability every stored kind provides: a kind tag, a namespaced key and a
/// way into the tagged [`Object`]
pub trait StoreObject: Resource + Clone + Send + Sync + 'static {
    /// Kind tag
    const KIND: Kind;

    /// Wrap into the tagged variant
    fn into_object(self) -> Object;

    /// The shelf holding this kind
    fn shelf(store: &Store) -> &Shelf<Self>;
}

macro_rules! store_object {
    ($ty:ty, $variant:ident, $field:ident) => {
        impl StoreObject for $ty {
            const KIND: Kind = Kind::$variant;

            fn into_object(self) -> Object {
                Object::$variant(self)
            }

            fn shelf(store: &Store) -> &Shelf<Self> {
                &store.$field
            }
        }
    };
}

store_object!(GatewayClass, GatewayClass, gateway_classes);
store_object!(GatewayConfig, GatewayConfig, gateway_configs);
store_object!(Gateway, Gateway, gateways);
store_object!(UDPRoute, UdpRoute, udp_routes);
store_object!(Service, Service, services);

/// Lock-protected map of one kind
#[derive(Debug)]
pub struct Shelf<K> {
    objects: RwLock<BTreeMap<ObjectKey, K>>,
}

impl<K> Default for Shelf<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K: StoreObject> Shelf<K> {
    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<ObjectKey, K>>, ControllerError> {
        self.objects
            .read()
            .map_err(|e| ControllerError::Fatal(format!("{} store lock poisoned: {}", K::KIND, e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<ObjectKey, K>>, ControllerError> {
        self.objects
            .write()
            .map_err(|e| ControllerError::Fatal(format!("{} store lock poisoned: {}", K::KIND, e)))
    }

    fn upsert(&self, obj: K) -> Result<(), ControllerError> {
        let Some(key) = ObjectKey::of(&obj) else {
            warn!("Ignoring {} without a name", K::KIND);
            return Ok(());
        };
        debug!("Store upsert {} {}", K::KIND, key);
        self.write()?.insert(key, obj);
        Ok(())
    }

    fn remove(&self, key: &ObjectKey) -> Result<bool, ControllerError> {
        debug!("Store remove {} {}", K::KIND, key);
        Ok(self.write()?.remove(key).is_some())
    }

    fn retain(&self, keep: &BTreeSet<ObjectKey>) -> Result<usize, ControllerError> {
        let mut objects = self.write()?;
        let before = objects.len();
        objects.retain(|key, _| keep.contains(key));
        Ok(before - objects.len())
    }

    fn get(&self, key: &ObjectKey) -> Result<Option<K>, ControllerError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn list(&self) -> Result<Vec<K>, ControllerError> {
        Ok(self.read()?.values().cloned().collect())
    }
}

/// Authoritative snapshot of all watched kinds
///
/// Constructed once at startup and shared by `Arc` between the watchers and the
/// renderer. Does not emit events.
#[derive(Debug, Default)]
pub struct Store {
    gateway_classes: Shelf<GatewayClass>,
    gateway_configs: Shelf<GatewayConfig>,
    gateways: Shelf<Gateway>,
    udp_routes: Shelf<UDPRoute>,
    services: Shelf<Service>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object under its key
    pub fn upsert(&self, object: Object) -> Result<(), ControllerError> {
        match object {
            Object::GatewayClass(o) => self.gateway_classes.upsert(o),
            Object::GatewayConfig(o) => self.gateway_configs.upsert(o),
            Object::Gateway(o) => self.gateways.upsert(o),
            Object::UdpRoute(o) => self.udp_routes.upsert(o),
            Object::Service(o) => self.services.upsert(o),
        }
    }

    /// Remove an object; returns whether it was present
    pub fn remove(&self, kind: Kind, key: &ObjectKey) -> Result<bool, ControllerError> {
        match kind {
            Kind::GatewayClass => self.gateway_classes.remove(key),
            Kind::GatewayConfig => self.gateway_configs.remove(key),
            Kind::Gateway => self.gateways.remove(key),
            Kind::UdpRoute => self.udp_routes.remove(key),
            Kind::Service => self.services.remove(key),
        }
    }

    /// Drop every object of `kind` whose key is not in `keep`; returns how many
    /// were dropped
    pub fn retain(&self, kind: Kind, keep: &BTreeSet<ObjectKey>) -> Result<usize, ControllerError> {
        match kind {
            Kind::GatewayClass => self.gateway_classes.retain(keep),
            Kind::GatewayConfig => self.gateway_configs.retain(keep),
            Kind::Gateway => self.gateways.retain(keep),
            Kind::UdpRoute => self.udp_routes.retain(keep),
            Kind::Service => self.services.retain(keep),
        }
    }

    /// Copy of a single object
    pub fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, ControllerError> {
        K::shelf(self).get(key)
    }

    /// Copies of all objects of a kind, sorted by key
    pub fn list<K: StoreObject>(&self) -> Result<Vec<K>, ControllerError> {
        K::shelf(self).list()
    }

    /// Gateways whose class is `class`
    pub fn gateways_for_class(&self, class: &GatewayClass) -> Result<Vec<Gateway>, ControllerError> {
        Ok(self
            .list::<Gateway>()?
            .into_iter()
            .filter(|gw| gateway_in_class(gw, class))
            .collect())
    }

    /// Routes with a parent reference to `gw`
    pub fn routes_for_gateway(&self, gw: &Gateway) -> Result<Vec<UDPRoute>, ControllerError> {
        Ok(self
            .list::<UDPRoute>()?
            .into_iter()
            .filter(|route| route_references_gateway(route, gw))
            .collect())
    }

    /// Services associated with `gw`
    pub fn services_exposing_gateway(&self, gw: &Gateway) -> Result<Vec<Service>, ControllerError> {
        Ok(self
            .list::<Service>()?
            .into_iter()
            .filter(|svc| service_exposes_gateway(svc, gw))
            .collect())
    }

    /// Copy every shelf
    ///
    /// Each shelf is copied under its own read lock; the locks are released
    /// before the snapshot is used.
    pub fn snapshot(&self) -> Result<Snapshot, ControllerError> {
        Ok(Snapshot {
            gateway_classes: self.list()?,
            gateway_configs: self.list()?,
            gateways: self.list()?,
            udp_routes: self.list()?,
            services: self.list()?,
        })
    }

    /// Poison one shelf lock so that every later snapshot fails
    #[cfg(test)]
    pub fn poison_for_test(&self) {
        std::thread::scope(|s| {
            let _ = s
                .spawn(|| {
                    let _guard = self.gateway_classes.objects.write();
                    panic!("poisoning store");
                })
                .join();
        });
    }
}

/// Immutable copy of the store a render pass works on
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// GatewayClasses sorted by key
    pub gateway_classes: Vec<GatewayClass>,
    /// GatewayConfigs sorted by key
    pub gateway_configs: Vec<GatewayConfig>,
    /// Gateways sorted by key
    pub gateways: Vec<Gateway>,
    /// UDPRoutes sorted by key
    pub udp_routes: Vec<UDPRoute>,
    /// Services sorted by key
    pub services: Vec<Service>,
}

impl Snapshot {
    /// Look up a GatewayConfig
    pub fn gateway_config(&self, key: &ObjectKey) -> Option<&GatewayConfig> {
        self.gateway_configs.iter().find(|c| ObjectKey::of(*c).as_ref() == Some(key))
    }

    /// Look up a Service
    pub fn service(&self, key: &ObjectKey) -> Option<&Service> {
        self.services.iter().find(|s| ObjectKey::of(*s).as_ref() == Some(key))
    }

    /// Look up a Gateway
    pub fn gateway(&self, key: &ObjectKey) -> Option<&Gateway> {
        self.gateways.iter().find(|g| ObjectKey::of(*g).as_ref() == Some(key))
    }

    /// Gateways whose class is `class`
    pub fn gateways_for_class<'a>(&'a self, class: &'a GatewayClass) -> impl Iterator<Item = &'a Gateway> {
        self.gateways.iter().filter(move |gw| gateway_in_class(gw, class))
    }

    /// Routes with a parent reference to `gw`
    pub fn routes_for_gateway<'a>(&'a self, gw: &'a Gateway) -> impl Iterator<Item = &'a UDPRoute> {
        self.udp_routes.iter().filter(move |route| route_references_gateway(route, gw))
    }

    /// Services associated with `gw`
    pub fn services_exposing_gateway<'a>(&'a self, gw: &'a Gateway) -> impl Iterator<Item = &'a Service> {
        self.services.iter().filter(move |svc| service_exposes_gateway(svc, gw))
    }
}

/// Whether `gw` belongs to `class`
pub fn gateway_in_class(gw: &Gateway, class: &GatewayClass) -> bool {
    gw.spec.gateway_class_name == class.name_any()
}

/// Whether one of the parent references of `route` names `gw`
pub fn route_references_gateway(route: &UDPRoute, gw: &Gateway) -> bool {
    route.spec.parent_refs.iter().any(|p| parent_names_gateway(p, route, gw))
}

/// Whether `parent` names `gw`
///
/// A parent reference without namespace refers to the route's namespace.
pub fn parent_names_gateway(parent: &ParentReference, route: &UDPRoute, gw: &Gateway) -> bool {
    let route_ns = route.namespace().unwrap_or_default();
    parent.is_gateway()
        && parent.name == gw.name_any()
        && parent.namespace.as_deref().unwrap_or(&route_ns) == gw.namespace().unwrap_or_default()
}

/// Whether `svc` is associated with `gw` through the related-gateway annotation
///
/// The annotation holds `<namespace>/<name>`, or a bare `<name>` in the
/// Service's own namespace.
pub fn service_exposes_gateway(svc: &Service, gw: &Gateway) -> bool {
    let Some(value) = svc.annotations().get(RELATED_GATEWAY_ANNOTATION) else {
        return false;
    };
    let svc_ns = svc.namespace().unwrap_or_default();
    let (ns, name) = match value.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (svc_ns.as_str(), value.as_str()),
    };
    gw.namespace().unwrap_or_default() == ns && gw.name_any() == name
}
