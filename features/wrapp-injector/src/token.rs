use std::{
    borrow::Cow,
    fmt::{Debug, Display},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::types::TypeInfo;

/// Identifies a requestable dependency inside a module
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    /// A type used as its own token
    Type(TypeInfo),
    /// A string token
    Named(Cow<'static, str>),
    /// A unique symbol, never equal to any other symbol
    Symbol(Symbol),
    /// One registration of a multi provider
    Element { of: Arc<Token>, index: usize },
}

impl Token {
    pub fn of<T: 'static + ?Sized>() -> Token {
        Token::Type(TypeInfo::of::<T>())
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Token {
        Token::Named(name.into())
    }

    /// Creates a new unique symbol token
    pub fn symbol(description: &'static str) -> Token {
        Token::Symbol(Symbol::new(description))
    }

    /// Human readable name used in diagnostics
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Stable representation of the token identity, used for module fingerprints
    pub(crate) fn fingerprint(&self) -> String {
        match self {
            Token::Type(info) => format!("type:{}:{:?}", info.type_name, info.type_id),
            Token::Named(name) => format!("named:{name}"),
            Token::Symbol(symbol) => format!("symbol:{}:{}", symbol.description, symbol.id),
            Token::Element { of, index } => format!("element:{}:{index}", of.fingerprint()),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Type(info) => Display::fmt(info, f),
            Token::Named(name) => f.write_str(name),
            Token::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
            Token::Element { of, index } => write!(f, "{of}[{index}]"),
        }
    }
}

impl From<TypeInfo> for Token {
    fn from(info: TypeInfo) -> Self {
        Token::Type(info)
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::Named(Cow::Borrowed(name))
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Named(Cow::Owned(name))
    }
}

/// A unique token, compared by its id only
#[derive(Clone, Debug)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

impl Symbol {
    fn new(description: &'static str) -> Self {
        Symbol {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Symbol {}
impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// A reference which is only resolved when it is looked up
///
/// Used to break declaration cycles, e.g. two modules importing each other
/// or two providers depending on each other.
pub struct ForwardRef<T>(Arc<dyn Fn() -> Option<T> + Send + Sync>);

impl<T> Clone for ForwardRef<T> {
    fn clone(&self) -> Self {
        ForwardRef(self.0.clone())
    }
}

impl<T> Debug for ForwardRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ForwardRef(..)")
    }
}

impl<T> ForwardRef<T> {
    pub fn new(resolve: impl Fn() -> Option<T> + Send + Sync + 'static) -> Self {
        ForwardRef(Arc::new(resolve))
    }

    pub fn resolve(&self) -> Option<T> {
        (self.0)()
    }
}

/// Wraps a callback into a forward reference which always resolves
pub fn forward_ref<T>(resolve: impl Fn() -> T + Send + Sync + 'static) -> ForwardRef<T> {
    ForwardRef::new(move || Some(resolve()))
}

/// A dependency token, either known upfront or forward referenced
#[derive(Clone, Debug)]
pub enum TokenRef {
    Token(Token),
    Forward(ForwardRef<Token>),
}

impl TokenRef {
    pub fn resolve(&self) -> Option<Token> {
        match self {
            TokenRef::Token(token) => Some(token.clone()),
            TokenRef::Forward(forward) => forward.resolve(),
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, TokenRef::Forward(_))
    }
}

impl Display for TokenRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.resolve() {
            Some(token) => Display::fmt(&token, f),
            None => f.write_str("<unresolved forward reference>"),
        }
    }
}

impl From<Token> for TokenRef {
    fn from(token: Token) -> Self {
        TokenRef::Token(token)
    }
}

impl From<ForwardRef<Token>> for TokenRef {
    fn from(forward: ForwardRef<Token>) -> Self {
        TokenRef::Forward(forward)
    }
}
