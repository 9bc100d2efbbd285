//! Declared parameter and result shapes of registered methods.
//!
//! The shapes are a small JSON Schema subset. They are only used for
//! discovery; values themselves go through serde on the wire, which is why a
//! [`MethodInfo`] is always built from the same Rust types its codec uses.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Boolean,
    Integer,
    String,
    Enum(Vec<&'static str>),
    Array(Box<Schema>),
    Object(Vec<Property>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: &'static str,
    pub schema: Schema,
    pub required: bool,
}

impl Property {
    pub fn required(name: &'static str, schema: Schema) -> Self {
        Self {
            name,
            schema,
            required: true,
        }
    }

    pub fn optional(name: &'static str, schema: Schema) -> Self {
        Self {
            name,
            schema,
            required: false,
        }
    }
}

impl Schema {
    pub fn array_of(items: Schema) -> Self {
        Self::Array(Box::new(items))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::String => json!({ "type": "string" }),
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Array(items) => json!({ "type": "array", "items": items.to_json() }),
            Self::Object(properties) => {
                let mut fields = Map::new();
                let mut required = Vec::new();
                for property in properties {
                    fields.insert(property.name.to_string(), property.schema.to_json());
                    if property.required {
                        required.push(property.name);
                    }
                }

                let mut object = json!({ "type": "object", "properties": fields });
                if !required.is_empty() {
                    object["required"] = json!(required);
                }
                object
            }
        }
    }
}

/// Types that can appear as a method parameter or result.
pub trait DescribeSchema {
    fn schema() -> Schema;
}

impl DescribeSchema for bool {
    fn schema() -> Schema {
        Schema::Boolean
    }
}

impl DescribeSchema for String {
    fn schema() -> Schema {
        Schema::String
    }
}

impl DescribeSchema for u8 {
    fn schema() -> Schema {
        Schema::Integer
    }
}

impl DescribeSchema for u32 {
    fn schema() -> Schema {
        Schema::Integer
    }
}

impl<T: DescribeSchema> DescribeSchema for Vec<T> {
    fn schema() -> Schema {
        Schema::array_of(T::schema())
    }
}

impl<T: DescribeSchema> DescribeSchema for Option<T> {
    fn schema() -> Schema {
        T::schema()
    }
}

/// A named parameter or result slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub name: &'static str,
    pub schema: Schema,
}

/// Description of one method: at most one parameter, at most one result.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub description: &'static str,
    pub params: Option<Slot>,
    pub result: Option<Slot>,
}

impl MethodInfo {
    pub fn new(description: &'static str) -> Self {
        Self {
            description,
            params: None,
            result: None,
        }
    }

    pub fn with_params<P: DescribeSchema>(mut self, name: &'static str) -> Self {
        self.params = Some(Slot {
            name,
            schema: P::schema(),
        });
        self
    }

    pub fn with_result<R: DescribeSchema>(mut self, name: &'static str) -> Self {
        self.result = Some(Slot {
            name,
            schema: R::schema(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_lists_only_required_properties() {
        let schema = Schema::Object(vec![
            Property::optional("id", Schema::String),
            Property::required("name", Schema::String),
        ]);

        let json = schema.to_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["id"]["type"], "string");
        assert_eq!(json["required"], json!(["name"]));
    }

    #[test]
    fn vec_describes_array_items() {
        let json = <Vec<bool>>::schema().to_json();
        assert_eq!(json, json!({"type": "array", "items": {"type": "boolean"}}));
    }

    #[test]
    fn method_info_records_slot_names() {
        let info = MethodInfo::new("Toggle autosave")
            .with_params::<bool>("enable")
            .with_result::<bool>("enabled");

        assert_eq!(info.params.as_ref().map(|slot| slot.name), Some("enable"));
        assert_eq!(info.result.map(|slot| slot.schema), Some(Schema::Boolean));
    }
}
