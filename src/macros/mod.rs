//! Declarative entity definitions.

/// Declare an entity: a marker type, its typed attribute and relation
/// descriptors, and its [`Entity`](crate::Entity) implementation.
///
/// Field names are column names. Each field becomes an associated constant of type
/// [`Attribute<Self, T>`](crate::Attribute); each relation becomes an associated
/// constant of type [`Relation<Self, Target>`](crate::Relation) joining
/// `local_column` on this entity to `remote_column` on the target.
///
/// # Example
///
/// ```no_run
/// querygroup::entity! {
///     pub struct Customer {
///         table: "customers",
///         key: id,
///         fields { id: i64, name: String }
///     }
/// }
///
/// querygroup::entity! {
///     pub struct Order {
///         table: "orders",
///         key: id,
///         fields { id: i64, status: String, customer_id: Option<i64> }
///         relations { customer: customer_id -> Customer.id }
///     }
/// }
///
/// use querygroup::AttributeTrait;
/// let open = Order::status.eq("OPEN");
/// ```
#[macro_export]
macro_rules! entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            table: $table:literal,
            key: $key:ident,
            fields { $($field:ident : $ty:ty),* $(,)? }
            $( relations { $($rel:ident : $local:ident -> $target:ident . $remote:ident),* $(,)? } )?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        $vis struct $name;

        #[allow(non_upper_case_globals, dead_code)]
        impl $name {
            $(
                pub const $field: $crate::Attribute<$name, $ty> =
                    $crate::Attribute::new(stringify!($field));
            )*
            $($(
                pub const $rel: $crate::Relation<$name, $target> =
                    $crate::Relation::new(stringify!($rel));
            )*)?
        }

        impl $crate::Entity for $name {
            const NAME: &'static str = stringify!($name);

            fn meta() -> $crate::EntityMeta {
                $crate::EntityMeta {
                    name: stringify!($name),
                    table: $table,
                    identifier: stringify!($key),
                    fields: vec![
                        $(
                            $crate::FieldMeta {
                                name: stringify!($field),
                                kind: <$ty as $crate::ValueType>::KIND,
                                nullable: <$ty as $crate::ValueType>::NULLABLE,
                            },
                        )*
                    ],
                    relations: vec![
                        $($(
                            $crate::RelationMeta {
                                name: stringify!($rel),
                                target: <$target as $crate::Entity>::NAME,
                                local_column: stringify!($local),
                                target_column: stringify!($remote),
                            },
                        )*)?
                    ],
                }
            }
        }
    };
}
