//! Object memory and message semantics of the simulated stone.

use std::{cmp::Ordering, fmt::Write};

use ahash::AHashMap;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    gci::{
        GciErrSType, OOP_ASCII_NUL, OOP_CLASS_CHARACTER, OOP_CLASS_DOUBLE_BYTE_STRING, OOP_CLASS_DOUBLE_BYTE_SYMBOL,
        OOP_CLASS_FLOAT, OOP_CLASS_INTEGER, OOP_CLASS_LARGE_INTEGER, OOP_CLASS_QUAD_BYTE_STRING,
        OOP_CLASS_QUAD_BYTE_SYMBOL, OOP_CLASS_SMALL_DOUBLE, OOP_CLASS_SMALL_INTEGER, OOP_CLASS_STRING,
        OOP_CLASS_SYMBOL, OOP_CLASS_UNICODE7, OOP_CLASS_UNICODE16, OOP_CLASS_UNICODE32, OOP_CLASS_UTF8, OOP_FALSE,
        OOP_ILLEGAL, OOP_NIL, OOP_TRUE, OopType,
    },
    oop::{Oop, decode_small_integer, encode_small_integer},
    session::selector_arity,
};

pub(super) type SimResult<T> = Result<T, Box<GciErrSType>>;

/// Error numbers raised by the simulated stone.
pub mod errors {
    /// Source did not compile, or named an undefined variable.
    pub const COMPILE_ERROR: i32 = 1001;
    /// Index outside the bounds of a collection.
    pub const INDEX_OUT_OF_RANGE: i32 = 2003;
    /// A message was not understood by its receiver.
    pub const DOES_NOT_UNDERSTAND: i32 = 2010;
    /// Key not present in a dictionary.
    pub const KEY_NOT_FOUND: i32 = 2023;
    /// An argument had the wrong class.
    pub const BAD_ARGUMENT: i32 = 2094;
    /// The oop does not name an object.
    pub const OBJECT_DOES_NOT_EXIST: i32 = 2101;
    /// A name could not be found in the symbol list.
    pub const UNDEFINED_SYMBOL: i32 = 2106;
    /// `error:` sent from Smalltalk code.
    pub const USER_ERROR: i32 = 2318;
    /// The process can not be resumed.
    pub const PROCESS_NOT_CONTINUABLE: i32 = 2357;
    /// Login refused.
    pub const LOGIN_DENIED: i32 = 4051;
    /// The session is not logged in.
    pub const INVALID_SESSION: i32 = 4100;
    /// The gem went away; the session is over.
    pub const GEM_TERMINATED: i32 = 4065;
}

/// Dynamically created objects start here, above the kernel classes.
const FIRST_DYNAMIC_INDEX: u64 = 4000;

#[derive(Debug, Clone)]
pub(super) enum Body {
    Bytes(Vec<u8>),
    Text(String),
    Float(f64),
    LargeInt(BigInt),
    Ordered(Vec<OopType>),
    Dict(Vec<(OopType, OopType)>),
    Set(Vec<OopType>),
    Class { name: String, superclass: OopType },
    Process { alive: bool, top: OopType },
    Exception { message: String },
    Empty,
}

#[derive(Debug, Clone)]
pub(super) struct ObjectRecord {
    pub class: OopType,
    pub body: Body,
}

/// Kernel classes the simulator needs by identity.
#[derive(Debug, Clone, Copy)]
pub(super) struct Kernel {
    pub undefined_object: OopType,
    pub boolean: OopType,
    pub ordered_collection: OopType,
    pub array: OopType,
    pub byte_array: OopType,
    pub key_value_dictionary: OopType,
    pub identity_set: OopType,
    pub gs_process: OopType,
    pub error: OopType,
    pub message_not_understood: OopType,
    pub user_globals: OopType,
    pub error_category: OopType,
}

/// A number as seen by arithmetic sends.
enum Num {
    Int(BigInt),
    Float(f64),
}

pub(super) fn character_oop(c: char) -> OopType {
    (u64::from(c) << 8) | OOP_ASCII_NUL
}

pub(super) fn oop_character(oop: OopType) -> Option<char> {
    if oop & 0xFF == OOP_ASCII_NUL {
        char::from_u32(u32::try_from(oop >> 8).ok()?)
    } else {
        None
    }
}

fn article(name: &str) -> &'static str {
    if name.starts_with(['A', 'E', 'I', 'O', 'U']) { "an" } else { "a" }
}

pub(super) struct Heap {
    objects: AHashMap<OopType, ObjectRecord>,
    /// Kernel globals by name, in definition order.
    globals: IndexMap<String, OopType>,
    symbols: AHashMap<String, OopType>,
    next_index: u64,
    pub kernel: Kernel,
}

impl Heap {
    pub fn boot() -> Self {
        let mut heap = Self {
            objects: AHashMap::new(),
            globals: IndexMap::new(),
            symbols: AHashMap::new(),
            next_index: FIRST_DYNAMIC_INDEX,
            kernel: Kernel {
                undefined_object: OOP_NIL,
                boolean: OOP_NIL,
                ordered_collection: OOP_NIL,
                array: OOP_NIL,
                byte_array: OOP_NIL,
                key_value_dictionary: OOP_NIL,
                identity_set: OOP_NIL,
                gs_process: OOP_NIL,
                error: OOP_NIL,
                message_not_understood: OOP_NIL,
                user_globals: OOP_NIL,
                error_category: OOP_NIL,
            },
        };
        // class objects are instances of Class, whose own record is filled in below
        let class_class = heap.reserve();

        let object = heap.define_class(class_class, None, "Object", OOP_NIL);
        heap.define_class(class_class, Some(class_class), "Class", object);
        let undefined_object = heap.define_class(class_class, None, "UndefinedObject", object);
        let boolean = heap.define_class(class_class, None, "Boolean", object);
        let magnitude = heap.define_class(class_class, None, "Magnitude", object);
        heap.define_class(class_class, Some(OOP_CLASS_CHARACTER), "Character", magnitude);
        let number = heap.define_class(class_class, None, "Number", magnitude);
        let integer = heap.define_class(class_class, Some(OOP_CLASS_INTEGER), "Integer", number);
        heap.define_class(class_class, Some(OOP_CLASS_SMALL_INTEGER), "SmallInteger", integer);
        heap.define_class(class_class, Some(OOP_CLASS_LARGE_INTEGER), "LargeInteger", integer);
        let binary_float = heap.define_class(class_class, None, "BinaryFloat", number);
        heap.define_class(class_class, Some(OOP_CLASS_FLOAT), "Float", binary_float);
        heap.define_class(class_class, Some(OOP_CLASS_SMALL_DOUBLE), "SmallDouble", binary_float);

        let collection = heap.define_class(class_class, None, "Collection", object);
        let sequenceable = heap.define_class(class_class, None, "SequenceableCollection", collection);
        let character_collection = heap.define_class(class_class, None, "CharacterCollection", sequenceable);
        let string = heap.define_class(class_class, Some(OOP_CLASS_STRING), "String", character_collection);
        heap.define_class(class_class, Some(OOP_CLASS_SYMBOL), "Symbol", string);
        heap.define_class(class_class, Some(OOP_CLASS_UNICODE7), "Unicode7", string);
        let double_byte =
            heap.define_class(class_class, Some(OOP_CLASS_DOUBLE_BYTE_STRING), "DoubleByteString", character_collection);
        heap.define_class(class_class, Some(OOP_CLASS_DOUBLE_BYTE_SYMBOL), "DoubleByteSymbol", double_byte);
        heap.define_class(class_class, Some(OOP_CLASS_UNICODE16), "Unicode16", double_byte);
        let quad_byte =
            heap.define_class(class_class, Some(OOP_CLASS_QUAD_BYTE_STRING), "QuadByteString", character_collection);
        heap.define_class(class_class, Some(OOP_CLASS_QUAD_BYTE_SYMBOL), "QuadByteSymbol", quad_byte);
        heap.define_class(class_class, Some(OOP_CLASS_UNICODE32), "Unicode32", quad_byte);
        heap.define_class(class_class, Some(OOP_CLASS_UTF8), "Utf8", character_collection);

        let ordered_collection = heap.define_class(class_class, None, "OrderedCollection", sequenceable);
        let array = heap.define_class(class_class, None, "Array", sequenceable);
        let byte_array = heap.define_class(class_class, None, "ByteArray", sequenceable);
        let hashed = heap.define_class(class_class, None, "HashedCollection", collection);
        let key_value_dictionary = heap.define_class(class_class, None, "KeyValueDictionary", hashed);
        let symbol_dictionary = heap.define_class(class_class, None, "SymbolDictionary", key_value_dictionary);
        let identity_set = heap.define_class(class_class, None, "IdentitySet", hashed);

        let gs_process = heap.define_class(class_class, None, "GsProcess", object);
        let exception = heap.define_class(class_class, None, "Exception", object);
        let error = heap.define_class(class_class, None, "Error", exception);
        let message_not_understood = heap.define_class(class_class, None, "MessageNotUnderstood", error);
        heap.define_class(class_class, None, "CompileError", error);

        let user_globals = heap.alloc(symbol_dictionary, Body::Dict(Vec::new()));
        heap.globals.insert("UserGlobals".to_owned(), user_globals);
        let error_category = heap.alloc(symbol_dictionary, Body::Dict(Vec::new()));
        heap.globals.insert("GemStoneError".to_owned(), error_category);

        heap.kernel = Kernel {
            undefined_object,
            boolean,
            ordered_collection,
            array,
            byte_array,
            key_value_dictionary,
            identity_set,
            gs_process,
            error,
            message_not_understood,
            user_globals,
            error_category,
        };
        heap
    }

    fn reserve(&mut self) -> OopType {
        let oop = self.next_index * 256 + 1;
        self.next_index += 1;
        oop
    }

    /// Defines a class, at `fixed` when it has a well-known oop.
    fn define_class(&mut self, metaclass: OopType, fixed: Option<OopType>, name: &str, superclass: OopType) -> OopType {
        let oop = fixed.unwrap_or_else(|| self.reserve());
        self.objects.insert(
            oop,
            ObjectRecord {
                class: metaclass,
                body: Body::Class {
                    name: name.to_owned(),
                    superclass,
                },
            },
        );
        self.globals.insert(name.to_owned(), oop);
        oop
    }

    pub fn alloc(&mut self, class: OopType, body: Body) -> OopType {
        let oop = self.reserve();
        self.objects.insert(oop, ObjectRecord { class, body });
        oop
    }

    pub fn get(&self, oop: OopType) -> SimResult<&ObjectRecord> {
        self.objects.get(&oop).ok_or_else(|| missing(oop))
    }

    pub fn get_mut(&mut self, oop: OopType) -> SimResult<&mut ObjectRecord> {
        self.objects.get_mut(&oop).ok_or_else(|| missing(oop))
    }

    pub fn exists(&self, oop: OopType) -> bool {
        self.class_of(oop).is_ok()
    }

    pub fn class_of(&self, oop: OopType) -> SimResult<OopType> {
        match oop {
            OOP_NIL => Ok(self.kernel.undefined_object),
            OOP_TRUE | OOP_FALSE => Ok(self.kernel.boolean),
            _ if Oop::new(oop).is_small_integer() => Ok(OOP_CLASS_SMALL_INTEGER),
            _ if oop_character(oop).is_some() => Ok(OOP_CLASS_CHARACTER),
            _ => Ok(self.get(oop)?.class),
        }
    }

    pub fn superclass(&self, class: OopType) -> Option<OopType> {
        match self.objects.get(&class).map(|r| &r.body) {
            Some(Body::Class { superclass, .. }) if *superclass != OOP_NIL => Some(*superclass),
            _ => None,
        }
    }

    pub fn inherits_from(&self, class: OopType, ancestor: OopType) -> bool {
        let mut current = Some(class);
        while let Some(class) = current {
            if class == ancestor {
                return true;
            }
            current = self.superclass(class);
        }
        false
    }

    pub fn is_kind_of(&self, object: OopType, class: OopType) -> SimResult<bool> {
        Ok(self.inherits_from(self.class_of(object)?, class))
    }

    pub fn class_name(&self, class: OopType) -> String {
        match self.objects.get(&class).map(|r| &r.body) {
            Some(Body::Class { name, .. }) => name.clone(),
            _ => format!("class{class}"),
        }
    }

    pub fn is_class(&self, oop: OopType) -> bool {
        matches!(self.objects.get(&oop).map(|r| &r.body), Some(Body::Class { .. }))
    }

    pub fn global(&self, name: &str) -> Option<OopType> {
        self.globals.get(name).copied()
    }

    /// Looks a name up in UserGlobals, then in the kernel globals.
    pub fn resolve(&self, name: &str) -> Option<OopType> {
        if let Ok(ObjectRecord {
            body: Body::Dict(pairs),
            ..
        }) = self.get(self.kernel.user_globals)
        {
            for &(key, value) in pairs {
                if self.text_of(key).as_deref() == Some(name) {
                    return Some(value);
                }
            }
        }
        self.global(name)
    }

    // =========================================================================
    // Value constructors and accessors
    // =========================================================================

    pub fn integer(&mut self, value: BigInt) -> OopType {
        match value.to_i64().map(encode_small_integer) {
            Some(Ok(oop)) => oop.raw(),
            _ => self.alloc(OOP_CLASS_LARGE_INTEGER, Body::LargeInt(value)),
        }
    }

    pub fn float(&mut self, value: f64) -> OopType {
        self.alloc(OOP_CLASS_FLOAT, Body::Float(value))
    }

    /// A string literal: String when every character fits in a byte, wider classes otherwise.
    pub fn string(&mut self, text: &str) -> OopType {
        let class = match text.chars().map(u32::from).max().unwrap_or(0) {
            0..=0xFF => OOP_CLASS_STRING,
            0x100..=0xFFFF => OOP_CLASS_DOUBLE_BYTE_STRING,
            _ => OOP_CLASS_QUAD_BYTE_STRING,
        };
        self.alloc(class, Body::Text(text.to_owned()))
    }

    /// A Unicode string, in the narrowest of Unicode7, Unicode16 and Unicode32.
    pub fn unicode_string(&mut self, text: &str) -> OopType {
        let class = match text.chars().map(u32::from).max().unwrap_or(0) {
            0..=0x7F => OOP_CLASS_UNICODE7,
            0x80..=0xFFFF => OOP_CLASS_UNICODE16,
            _ => OOP_CLASS_UNICODE32,
        };
        self.alloc(class, Body::Text(text.to_owned()))
    }

    /// The canonical symbol for `text`.
    pub fn symbol(&mut self, text: &str) -> OopType {
        if let Some(&oop) = self.symbols.get(text) {
            return oop;
        }
        let class = if text.chars().all(|c| u32::from(c) <= 0xFF) {
            OOP_CLASS_SYMBOL
        } else {
            OOP_CLASS_DOUBLE_BYTE_SYMBOL
        };
        let oop = self.alloc(class, Body::Text(text.to_owned()));
        self.symbols.insert(text.to_owned(), oop);
        oop
    }

    pub fn is_symbol(&self, oop: OopType) -> bool {
        matches!(
            self.objects.get(&oop).map(|r| r.class),
            Some(OOP_CLASS_SYMBOL | OOP_CLASS_DOUBLE_BYTE_SYMBOL | OOP_CLASS_QUAD_BYTE_SYMBOL)
        )
    }

    pub fn text_of(&self, oop: OopType) -> Option<String> {
        if let Some(c) = oop_character(oop) {
            return Some(c.to_string());
        }
        match self.objects.get(&oop).map(|r| &r.body) {
            Some(Body::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    fn number_of(&self, oop: OopType) -> Option<Num> {
        if let Ok(value) = decode_small_integer(Oop::new(oop)) {
            return Some(Num::Int(BigInt::from(value)));
        }
        match self.objects.get(&oop).map(|r| &r.body) {
            Some(Body::LargeInt(value)) => Some(Num::Int(value.clone())),
            Some(Body::Float(value)) => Some(Num::Float(*value)),
            _ => None,
        }
    }

    pub fn to_double(&self, oop: OopType) -> SimResult<f64> {
        match self.number_of(oop) {
            Some(Num::Float(value)) => Ok(value),
            Some(Num::Int(value)) => Ok(value.to_f64().unwrap_or(f64::NAN)),
            None => Err(self.error(errors::BAD_ARGUMENT, &format!("{} is not a number", self.describe(oop)))),
        }
    }

    /// The bytes `fetch_bytes` transfers: raw contents of byte objects, one byte per
    /// character for single-byte strings, UTF-8 for everything else.
    pub fn byte_contents(&self, oop: OopType) -> SimResult<Vec<u8>> {
        let record = self.get(oop)?;
        match &record.body {
            Body::Bytes(bytes) => Ok(bytes.clone()),
            Body::Text(text) if matches!(record.class, OOP_CLASS_STRING | OOP_CLASS_SYMBOL | OOP_CLASS_UNICODE7) => {
                Ok(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect())
            }
            Body::Text(text) => Ok(text.as_bytes().to_vec()),
            _ => Err(self.error(errors::BAD_ARGUMENT, &format!("{} is not a byte object", self.describe(oop)))),
        }
    }

    /// Value equality as `=` sees it.
    pub fn equal(&self, a: OopType, b: OopType) -> bool {
        if a == b {
            return true;
        }
        if let (Some(x), Some(y)) = (self.number_of(a), self.number_of(b)) {
            return compare(&x, &y) == Some(Ordering::Equal);
        }
        match (self.text_of(a), self.text_of(b)) {
            (Some(x), Some(y)) => x == y && self.is_symbol(a) == self.is_symbol(b),
            _ => false,
        }
    }

    /// `a SomeClass` / `an Object`, the default printString.
    pub fn describe(&self, oop: OopType) -> String {
        let name = self.class_of(oop).map_or_else(|_| "Object".to_owned(), |c| self.class_name(c));
        format!("{} {name}", article(&name))
    }

    pub fn display_string(&self, oop: OopType) -> String {
        match oop {
            OOP_NIL => return "nil".to_owned(),
            OOP_TRUE => return "true".to_owned(),
            OOP_FALSE => return "false".to_owned(),
            _ => {}
        }
        if let Ok(value) = decode_small_integer(Oop::new(oop)) {
            return value.to_string();
        }
        if let Some(c) = oop_character(oop) {
            return c.to_string();
        }
        match self.objects.get(&oop).map(|r| &r.body) {
            Some(Body::Text(text)) => text.clone(),
            Some(Body::LargeInt(value)) => value.to_string(),
            Some(Body::Float(value)) => {
                let mut text = value.to_string();
                if value.is_finite() && !text.contains('.') {
                    text.push_str(".0");
                }
                text
            }
            Some(Body::Class { name, .. }) => name.clone(),
            Some(Body::Exception { message }) => message.clone(),
            _ => self.describe(oop),
        }
    }

    fn print_string(&self, oop: OopType) -> String {
        if let Some(c) = oop_character(oop) {
            return format!("${c}");
        }
        match (self.objects.get(&oop).map(|r| &r.body), self.is_symbol(oop)) {
            (Some(Body::Text(text)), true) => format!("#{text}"),
            (Some(Body::Text(text)), false) => {
                let mut out = String::from("'");
                for c in text.chars() {
                    if c == '\'' {
                        out.push('\'');
                    }
                    out.push(c);
                }
                out.push('\'');
                out
            }
            (Some(Body::Ordered(items) | Body::Set(items)), _) => {
                let mut out = format!("{}(", self.describe(oop).replace(' ', ""));
                for item in items {
                    let _ = write!(out, " {}", self.print_string(*item));
                }
                out.push_str(" )");
                out
            }
            _ => self.display_string(oop),
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    /// A plain error record, without a suspended process.
    pub fn error(&self, number: i32, message: &str) -> Box<GciErrSType> {
        let mut err = GciErrSType::new(number, message, "");
        err.category = self.kernel.error_category;
        err.context = OOP_NIL;
        Box::new(err)
    }

    /// Signals a resumable error: allocates the exception and a suspended process to continue.
    pub fn signal(&mut self, class: OopType, number: i32, message: String, args: &[OopType]) -> Box<GciErrSType> {
        let exception = self.alloc(class, Body::Exception {
            message: message.clone(),
        });
        let process = self.alloc(self.kernel.gs_process, Body::Process {
            alive: true,
            top: OOP_ILLEGAL,
        });
        let mut err = self.error(number, &message);
        err.context = process;
        err.exception_obj = exception;
        for (slot, &arg) in err.args.iter_mut().zip(args) {
            *slot = arg;
        }
        err.arg_count = i32::try_from(args.len().min(err.args.len())).unwrap_or(0);
        err
    }

    fn does_not_understand(&mut self, receiver: OopType, selector: &str, args: &[OopType]) -> Box<GciErrSType> {
        let message = format!(
            "a MessageNotUnderstood occurred (error {}), {} does not understand  #'{selector}'",
            errors::DOES_NOT_UNDERSTAND,
            self.describe(receiver)
        );
        let selector = self.symbol(selector);
        let arguments = self.alloc(self.kernel.array, Body::Ordered(args.to_vec()));
        self.signal(
            self.kernel.message_not_understood,
            errors::DOES_NOT_UNDERSTAND,
            message,
            &[receiver, selector, arguments],
        )
    }

    /// Marks a suspended process finished; fails if it is not a live process.
    pub fn finish_process(&mut self, process: OopType) -> SimResult<OopType> {
        let not_continuable = self.error(
            errors::PROCESS_NOT_CONTINUABLE,
            &format!("the process {process} can not be continued"),
        );
        match self.objects.get_mut(&process).map(|r| &mut r.body) {
            Some(Body::Process { alive, top }) if *alive => {
                *alive = false;
                Ok(*top)
            }
            _ => Err(not_continuable),
        }
    }

    // =========================================================================
    // Message sends
    // =========================================================================

    pub fn send(&mut self, receiver: OopType, selector: &str, args: &[OopType]) -> SimResult<OopType> {
        if !self.exists(receiver) {
            return Err(missing(receiver));
        }
        if selector_arity(selector) != args.len() {
            return Err(self.error(
                errors::BAD_ARGUMENT,
                &format!("{selector} takes {} arguments, got {}", selector_arity(selector), args.len()),
            ));
        }
        let arg = args.first().copied().unwrap_or(OOP_NIL);
        match (selector, args.len()) {
            ("yourself", 0) => Ok(receiver),
            ("class", 0) => self.class_of(receiver),
            ("isNil", 0) => Ok(bool_oop(receiver == OOP_NIL)),
            ("notNil", 0) => Ok(bool_oop(receiver != OOP_NIL)),
            ("==", 1) => Ok(bool_oop(receiver == arg)),
            ("~~", 1) => Ok(bool_oop(receiver != arg)),
            ("=", 1) => Ok(bool_oop(self.equal(receiver, arg))),
            ("~=", 1) => Ok(bool_oop(!self.equal(receiver, arg))),
            ("isKindOf:", 1) => Ok(bool_oop(self.is_kind_of(receiver, arg)?)),
            ("printString", 0) => {
                let text = self.print_string(receiver);
                Ok(self.string(&text))
            }
            ("asString", 0) => {
                if self.text_of(receiver).is_some() && oop_character(receiver).is_none() && !self.is_symbol(receiver) {
                    Ok(receiver)
                } else {
                    let text = self.display_string(receiver);
                    Ok(self.string(&text))
                }
            }
            ("asSymbol", 0) => match self.text_of(receiver) {
                Some(text) => Ok(self.symbol(&text)),
                None => Err(self.does_not_understand(receiver, selector, args)),
            },
            ("error:", 1) => {
                let message = self.display_string(arg);
                Err(self.signal(self.kernel.error, errors::USER_ERROR, message, &[arg]))
            }
            ("+" | "-" | "*" | "<" | ">" | "<=" | ">=", 1) if self.number_of(receiver).is_some() => {
                self.arithmetic(receiver, selector, arg)
            }
            (",", 1) => match (self.text_of(receiver), self.text_of(arg)) {
                (Some(a), Some(b)) => Ok(self.string(&(a + &b))),
                _ => Err(self.does_not_understand(receiver, selector, args)),
            },
            ("name", 0) if self.is_class(receiver) => {
                let name = self.class_name(receiver);
                Ok(self.symbol(&name))
            }
            ("new", 0) if self.is_class(receiver) => Ok(self.instantiate(receiver)),
            _ => self.collection_send(receiver, selector, args),
        }
    }

    fn instantiate(&mut self, class: OopType) -> OopType {
        let k = self.kernel;
        let body = if self.inherits_from(class, k.key_value_dictionary) {
            Body::Dict(Vec::new())
        } else if self.inherits_from(class, k.identity_set) {
            Body::Set(Vec::new())
        } else if self.inherits_from(class, k.ordered_collection) || self.inherits_from(class, k.array) {
            Body::Ordered(Vec::new())
        } else if self.inherits_from(class, k.byte_array) {
            Body::Bytes(Vec::new())
        } else if self.inherits_from(class, OOP_CLASS_STRING) {
            Body::Text(String::new())
        } else {
            Body::Empty
        };
        self.alloc(class, body)
    }

    fn arithmetic(&mut self, receiver: OopType, selector: &str, arg: OopType) -> SimResult<OopType> {
        let (Some(a), Some(b)) = (self.number_of(receiver), self.number_of(arg)) else {
            return Err(self.error(
                errors::BAD_ARGUMENT,
                &format!("{} is not a number", self.describe(arg)),
            ));
        };
        let ordering = compare(&a, &b);
        let result = match selector {
            "<" => return Ok(bool_oop(ordering == Some(Ordering::Less))),
            ">" => return Ok(bool_oop(ordering == Some(Ordering::Greater))),
            "<=" => return Ok(bool_oop(matches!(ordering, Some(Ordering::Less | Ordering::Equal)))),
            ">=" => return Ok(bool_oop(matches!(ordering, Some(Ordering::Greater | Ordering::Equal)))),
            _ => match (a, b) {
                (Num::Int(a), Num::Int(b)) => Num::Int(match selector {
                    "+" => a + b,
                    "-" => a - b,
                    _ => a * b,
                }),
                (a, b) => {
                    let (a, b) = (as_f64(&a), as_f64(&b));
                    Num::Float(match selector {
                        "+" => a + b,
                        "-" => a - b,
                        _ => a * b,
                    })
                }
            },
        };
        Ok(match result {
            Num::Int(value) => self.integer(value),
            Num::Float(value) => self.float(value),
        })
    }

    fn index(&self, oop: OopType, len: usize) -> SimResult<usize> {
        match decode_small_integer(Oop::new(oop)).ok().and_then(|i| usize::try_from(i).ok()) {
            Some(i) if (1..=len).contains(&i) => Ok(i - 1),
            _ => Err(self.error(
                errors::INDEX_OUT_OF_RANGE,
                &format!("index {} is out of range 1 to {len}", self.display_string(oop)),
            )),
        }
    }

    fn dict_position(&self, pairs: &[(OopType, OopType)], key: OopType) -> Option<usize> {
        pairs.iter().position(|&(k, _)| self.equal(k, key))
    }

    fn collection_send(&mut self, receiver: OopType, selector: &str, args: &[OopType]) -> SimResult<OopType> {
        let (class, body) = match self.objects.get(&receiver) {
            Some(record) => (record.class, record.body.clone()),
            None => return Err(self.does_not_understand(receiver, selector, args)),
        };
        let arg = args.first().copied().unwrap_or(OOP_NIL);
        let k = self.kernel;
        match (selector, body) {
            ("size", Body::Ordered(items) | Body::Set(items)) => Ok(small(items.len())),
            ("size", Body::Dict(pairs)) => Ok(small(pairs.len())),
            ("size", Body::Bytes(bytes)) => Ok(small(bytes.len())),
            ("size", Body::Text(text)) => Ok(small(text.chars().count())),
            ("isEmpty", Body::Ordered(items) | Body::Set(items)) => Ok(bool_oop(items.is_empty())),
            ("isEmpty", Body::Dict(pairs)) => Ok(bool_oop(pairs.is_empty())),
            ("isEmpty", Body::Text(text)) => Ok(bool_oop(text.is_empty())),
            ("add:", Body::Ordered(mut items)) if class != k.array => {
                items.push(arg);
                self.get_mut(receiver)?.body = Body::Ordered(items);
                Ok(arg)
            }
            ("add:", Body::Set(mut items)) => {
                if !items.contains(&arg) {
                    items.push(arg);
                    self.get_mut(receiver)?.body = Body::Set(items);
                }
                Ok(arg)
            }
            ("includes:", Body::Set(items)) => Ok(bool_oop(items.contains(&arg))),
            ("includes:", Body::Ordered(items)) => Ok(bool_oop(items.iter().any(|&i| self.equal(i, arg)))),
            ("at:", Body::Ordered(items)) => Ok(items[self.index(arg, items.len())?]),
            ("at:", Body::Bytes(bytes)) => Ok(small(usize::from(bytes[self.index(arg, bytes.len())?]))),
            ("at:", Body::Text(text)) => {
                let chars: Vec<char> = text.chars().collect();
                Ok(character_oop(chars[self.index(arg, chars.len())?]))
            }
            ("at:", Body::Dict(pairs)) => match self.dict_position(&pairs, arg) {
                Some(i) => Ok(pairs[i].1),
                None => Err(self.error(
                    errors::KEY_NOT_FOUND,
                    &format!("key {} not found", self.print_string(arg)),
                )),
            },
            ("at:put:", Body::Ordered(mut items)) => {
                let value = args[1];
                let i = self.index(arg, items.len())?;
                items[i] = value;
                self.get_mut(receiver)?.body = Body::Ordered(items);
                Ok(value)
            }
            ("at:put:", Body::Dict(mut pairs)) => {
                let value = args[1];
                match self.dict_position(&pairs, arg) {
                    Some(i) => pairs[i].1 = value,
                    None => pairs.push((arg, value)),
                }
                self.get_mut(receiver)?.body = Body::Dict(pairs);
                Ok(value)
            }
            ("includesKey:", Body::Dict(pairs)) => Ok(bool_oop(self.dict_position(&pairs, arg).is_some())),
            ("removeKey:", Body::Dict(mut pairs)) => match self.dict_position(&pairs, arg) {
                Some(i) => {
                    let (_, value) = pairs.remove(i);
                    self.get_mut(receiver)?.body = Body::Dict(pairs);
                    Ok(value)
                }
                None => Err(self.error(
                    errors::KEY_NOT_FOUND,
                    &format!("key {} not found", self.print_string(arg)),
                )),
            },
            ("keys", Body::Dict(pairs)) => {
                let keys = pairs.iter().map(|&(key, _)| key).collect();
                Ok(self.alloc(k.identity_set, Body::Set(keys)))
            }
            ("values", Body::Dict(pairs)) => {
                let values = pairs.iter().map(|&(_, value)| value).collect();
                Ok(self.alloc(k.array, Body::Ordered(values)))
            }
            ("asArray", Body::Ordered(items) | Body::Set(items)) => Ok(self.alloc(k.array, Body::Ordered(items))),
            ("asArray", Body::Dict(pairs)) => {
                let values = pairs.iter().map(|&(_, value)| value).collect();
                Ok(self.alloc(k.array, Body::Ordered(values)))
            }
            _ => Err(self.does_not_understand(receiver, selector, args)),
        }
    }

    /// Contents of UserGlobals, for commit and abort.
    pub fn user_globals(&self) -> Vec<(OopType, OopType)> {
        match self.objects.get(&self.kernel.user_globals).map(|r| &r.body) {
            Some(Body::Dict(pairs)) => pairs.clone(),
            _ => Vec::new(),
        }
    }

    pub fn restore_user_globals(&mut self, pairs: Vec<(OopType, OopType)>) {
        if let Some(record) = self.objects.get_mut(&self.kernel.user_globals) {
            record.body = Body::Dict(pairs);
        }
    }
}

fn missing(oop: OopType) -> Box<GciErrSType> {
    Box::new(GciErrSType::new(
        errors::OBJECT_DOES_NOT_EXIST,
        &format!("object with oop {oop} does not exist"),
        "",
    ))
}

fn bool_oop(value: bool) -> OopType {
    Oop::from_bool(value).raw()
}

fn small(value: usize) -> OopType {
    i64::try_from(value)
        .ok()
        .and_then(|v| encode_small_integer(v).ok())
        .map_or(OOP_NIL, Oop::raw)
}

fn as_f64(num: &Num) -> f64 {
    match num {
        Num::Int(value) => value.to_f64().unwrap_or(f64::NAN),
        Num::Float(value) => *value,
    }
}

fn compare(a: &Num, b: &Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => Some(a.cmp(b)),
        _ => as_f64(a).partial_cmp(&as_f64(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_and_large_integers_split_at_the_tag_range() {
        let mut heap = Heap::boot();
        let small = heap.integer(BigInt::from(42));
        assert!(Oop::new(small).is_small_integer());
        let large = heap.integer(BigInt::from(1u64 << 62));
        assert_eq!(heap.class_of(large).unwrap(), OOP_CLASS_LARGE_INTEGER);
    }

    #[test]
    fn kernel_hierarchy_answers_kind_of() {
        let heap = Heap::boot();
        let symbol = heap.global("Symbol").unwrap();
        assert!(heap.inherits_from(symbol, OOP_CLASS_STRING));
        assert!(!heap.inherits_from(OOP_CLASS_STRING, symbol));
        assert_eq!(heap.class_of(character_oop('x')).unwrap(), OOP_CLASS_CHARACTER);
    }

    #[test]
    fn unknown_messages_suspend_a_process() {
        let mut heap = Heap::boot();
        let err = heap.send(OOP_NIL, "frobnicate", &[]).unwrap_err();
        assert_eq!(err.number, errors::DOES_NOT_UNDERSTAND);
        assert_eq!(
            err.message_text(),
            "a MessageNotUnderstood occurred (error 2010), an UndefinedObject does not understand  #'frobnicate'"
        );
        assert!(heap.finish_process(err.context).is_ok());
        assert!(heap.finish_process(err.context).is_err());
    }

    #[test]
    fn symbols_are_canonical() {
        let mut heap = Heap::boot();
        assert_eq!(heap.symbol("foo"), heap.symbol("foo"));
        assert_ne!(heap.symbol("foo"), heap.symbol("bar"));
    }
}
